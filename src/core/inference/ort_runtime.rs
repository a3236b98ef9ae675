//! ONNX Runtime implementation of [`InferenceRuntime`].

use super::backend::{InferenceRuntime, NativeModel, RuntimeFailure};
use crate::core::config::{
    ConfigValidator, ModelSource, OrtExecutionProvider, OrtGraphOptimizationLevel,
    OrtSessionConfig, SessionConfig,
};
use crate::core::errors::{AdvisorError, OpaqueError};
use crate::core::tensor::{ElementType, TensorDescriptor, TensorElement, TensorSpec};
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::{Session, SessionInputValue, SessionInputs, builder::SessionBuilder};
use ort::value::{DynValue, TensorRef};
use std::borrow::Cow;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const SESSION_CREATION_FAILURE: &str = "failed to create ONNX session";

/// Loads models with ONNX Runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtRuntime;

impl OrtRuntime {
    /// Creates the runtime.
    pub fn new() -> Self {
        Self
    }
}

impl InferenceRuntime for OrtRuntime {
    fn load(
        &self,
        source: &ModelSource,
        config: &SessionConfig,
    ) -> Result<Box<dyn NativeModel>, AdvisorError> {
        if let ModelSource::Path(path) = source {
            config.validate_model_path(path).map_err(|e| {
                AdvisorError::model_load_error(
                    source.describe(),
                    "model file is not readable",
                    Some("verify the model path"),
                    Some(e),
                )
            })?;
        }

        let pool_size = config.session_pool_size.max(1);
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let session = load_session_with(
                source,
                |builder| match &config.ort_session {
                    Some(cfg) => apply_ort_config(builder, cfg),
                    None => builder.with_log_level(LogLevel::Error),
                },
                Some("check the model file and the execution provider configuration"),
            )?;
            sessions.push(Mutex::new(session));
        }

        tracing::debug!(
            model = %config.model_name,
            pool_size,
            "created ONNX Runtime session pool"
        );

        Ok(Box::new(OrtModel {
            sessions,
            next_idx: AtomicUsize::new(0),
            model_name: config.model_name.clone(),
            inputs: config.contract.inputs.clone(),
            outputs: config.contract.outputs.clone(),
        }))
    }
}

/// Builds a session using a caller-provided builder configuration.
pub(crate) fn load_session_with<F>(
    source: &ModelSource,
    configure_builder: F,
    suggestion: Option<&str>,
) -> Result<Session, AdvisorError>
where
    F: FnOnce(SessionBuilder) -> Result<SessionBuilder, ort::Error>,
{
    let location = source.describe();
    let builder = Session::builder()
        .and_then(configure_builder)
        .map_err(|e| {
            AdvisorError::model_load_error(
                &location,
                "invalid session configuration",
                suggestion,
                Some(e),
            )
        })?;
    let session = match source {
        ModelSource::Path(path) => builder.commit_from_file(path),
        ModelSource::Bytes(bytes) => builder.commit_from_memory(bytes),
    }
    .map_err(|e| {
        AdvisorError::model_load_error(&location, SESSION_CREATION_FAILURE, suggestion, Some(e))
    })?;
    Ok(session)
}

fn apply_ort_config(
    mut builder: SessionBuilder,
    cfg: &OrtSessionConfig,
) -> Result<SessionBuilder, ort::Error> {
    let log_level = match cfg.log_severity_level {
        Some(0) => LogLevel::Verbose,
        Some(1) => LogLevel::Info,
        Some(2) => LogLevel::Warning,
        Some(4) => LogLevel::Fatal,
        _ => LogLevel::Error,
    };
    builder = builder.with_log_level(log_level)?;
    if let Some(intra) = cfg.intra_threads {
        builder = builder.with_intra_threads(intra)?;
    }
    if let Some(inter) = cfg.inter_threads {
        builder = builder.with_inter_threads(inter)?;
    }
    if let Some(par) = cfg.parallel_execution {
        builder = builder.with_parallel_execution(par)?;
    }
    if let Some(level) = cfg.optimization_level {
        use OrtGraphOptimizationLevel as OG;
        use ort::session::builder::GraphOptimizationLevel as GOL;
        let mapped = match level {
            OG::DisableAll => GOL::Disable,
            OG::Level1 => GOL::Level1,
            OG::Level2 => GOL::Level2,
            OG::Level3 => GOL::Level3,
        };
        builder = builder.with_optimization_level(mapped)?;
    }
    if let Some(enable) = cfg.enable_mem_pattern {
        builder = builder.with_memory_pattern(enable)?;
    }
    if let Some(eps) = &cfg.execution_providers {
        let providers = build_execution_providers(eps, cfg.enable_cpu_mem_arena)?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
    }
    Ok(builder)
}

/// Builds execution providers from configuration
fn build_execution_providers(
    eps: &[OrtExecutionProvider],
    cpu_arena: Option<bool>,
) -> Result<Vec<ExecutionProviderDispatch>, ort::Error> {
    use OrtExecutionProvider as EP;
    let mut providers = Vec::new();

    for ep in eps {
        match ep {
            EP::CPU => {
                let mut cpu_provider = ort::execution_providers::CPUExecutionProvider::default();
                if let Some(arena) = cpu_arena {
                    cpu_provider = cpu_provider.with_arena_allocator(arena);
                }
                providers.push(cpu_provider.build());
            }
            #[cfg(feature = "cuda")]
            EP::CUDA { device_id } => {
                let mut cuda_provider = ort::execution_providers::CUDAExecutionProvider::default();
                if let Some(id) = device_id {
                    cuda_provider = cuda_provider.with_device_id(*id);
                }
                providers.push(cuda_provider.build());
            }
            #[cfg(feature = "tensorrt")]
            EP::TensorRT {
                device_id,
                max_workspace_size,
                fp16_enable,
            } => {
                let mut trt_provider =
                    ort::execution_providers::TensorRTExecutionProvider::default();
                if let Some(id) = device_id {
                    trt_provider = trt_provider.with_device_id(*id);
                }
                if let Some(workspace) = max_workspace_size {
                    trt_provider = trt_provider.with_max_workspace_size(*workspace);
                }
                if let Some(fp16) = fp16_enable {
                    trt_provider = trt_provider.with_fp16(*fp16);
                }
                providers.push(trt_provider.build());
            }
            #[cfg(feature = "directml")]
            EP::DirectML { device_id } => {
                let mut dml_provider =
                    ort::execution_providers::DirectMLExecutionProvider::default();
                if let Some(id) = device_id {
                    dml_provider = dml_provider.with_device_id(*id);
                }
                providers.push(dml_provider.build());
            }
            #[cfg(feature = "coreml")]
            EP::CoreML { subgraphs } => {
                let mut coreml_provider =
                    ort::execution_providers::CoreMLExecutionProvider::default();
                if let Some(sub) = subgraphs {
                    coreml_provider = coreml_provider.with_subgraphs(*sub);
                }
                providers.push(coreml_provider.build());
            }
            #[cfg(not(feature = "cuda"))]
            EP::CUDA { .. } => {
                return Err(ort::Error::new(
                    "CUDA execution provider requested but cuda feature is not enabled",
                ));
            }
            #[cfg(not(feature = "tensorrt"))]
            EP::TensorRT { .. } => {
                return Err(ort::Error::new(
                    "TensorRT execution provider requested but tensorrt feature is not enabled",
                ));
            }
            #[cfg(not(feature = "directml"))]
            EP::DirectML { .. } => {
                return Err(ort::Error::new(
                    "DirectML execution provider requested but directml feature is not enabled",
                ));
            }
            #[cfg(not(feature = "coreml"))]
            EP::CoreML { .. } => {
                return Err(ort::Error::new(
                    "CoreML execution provider requested but coreml feature is not enabled",
                ));
            }
        }
    }

    Ok(providers)
}

/// Typed copy of an input buffer that ONNX Runtime can borrow.
enum InputBuffer {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

impl InputBuffer {
    fn from_descriptor(tensor: &TensorDescriptor) -> Result<Self, AdvisorError> {
        Ok(match tensor.dtype() {
            ElementType::Float32 => InputBuffer::F32(tensor.to_vec()?),
            ElementType::Float64 => InputBuffer::F64(tensor.to_vec()?),
            ElementType::Int64 => InputBuffer::I64(tensor.to_vec()?),
            ElementType::Int32 => InputBuffer::I32(tensor.to_vec()?),
            ElementType::UInt8 => InputBuffer::U8(tensor.as_bytes().to_vec()),
        })
    }

    fn as_input_value(&self, dims: Vec<i64>) -> Result<SessionInputValue<'_>, ort::Error> {
        Ok(match self {
            InputBuffer::F32(data) => TensorRef::from_array_view((dims, data.as_slice()))?.into(),
            InputBuffer::F64(data) => TensorRef::from_array_view((dims, data.as_slice()))?.into(),
            InputBuffer::I64(data) => TensorRef::from_array_view((dims, data.as_slice()))?.into(),
            InputBuffer::I32(data) => TensorRef::from_array_view((dims, data.as_slice()))?.into(),
            InputBuffer::U8(data) => TensorRef::from_array_view((dims, data.as_slice()))?.into(),
        })
    }
}

/// A model loaded into a pool of ONNX Runtime sessions.
#[derive(Debug)]
pub struct OrtModel {
    /// Pool of ONNX Runtime sessions for concurrent calls.
    sessions: Vec<Mutex<Session>>,
    /// Next index for round-robin session selection.
    next_idx: AtomicUsize,
    model_name: String,
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
}

impl OrtModel {
    fn extract_output(
        &self,
        spec: &TensorSpec,
        value: Option<&DynValue>,
    ) -> Result<TensorDescriptor, RuntimeFailure> {
        let value = value.ok_or_else(|| {
            RuntimeFailure::recoverable(OpaqueError(format!(
                "model '{}' produced no output named '{}'",
                self.model_name, spec.name
            )))
        })?;

        fn descriptor<T>(
            shape: impl Iterator<Item = i64>,
            data: &[T],
        ) -> Result<TensorDescriptor, RuntimeFailure>
        where
            T: TensorElement,
        {
            let shape = shape
                .map(usize::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(RuntimeFailure::recoverable)?;
            TensorDescriptor::from_values(shape, data).map_err(RuntimeFailure::recoverable)
        }

        let extracted = match spec.dtype {
            ElementType::Float32 => value
                .try_extract_tensor::<f32>()
                .map(|(shape, data)| descriptor(shape.iter().copied(), data)),
            ElementType::Float64 => value
                .try_extract_tensor::<f64>()
                .map(|(shape, data)| descriptor(shape.iter().copied(), data)),
            ElementType::Int64 => value
                .try_extract_tensor::<i64>()
                .map(|(shape, data)| descriptor(shape.iter().copied(), data)),
            ElementType::Int32 => value
                .try_extract_tensor::<i32>()
                .map(|(shape, data)| descriptor(shape.iter().copied(), data)),
            ElementType::UInt8 => value
                .try_extract_tensor::<u8>()
                .map(|(shape, data)| descriptor(shape.iter().copied(), data)),
        };
        extracted.map_err(RuntimeFailure::recoverable)?
    }
}

impl NativeModel for OrtModel {
    fn run(&self, inputs: &[TensorDescriptor]) -> Result<Vec<TensorDescriptor>, RuntimeFailure> {
        let buffers = inputs
            .iter()
            .map(InputBuffer::from_descriptor)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RuntimeFailure::recoverable)?;

        let mut values: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = Vec::with_capacity(inputs.len());
        for ((spec, tensor), buffer) in self.inputs.iter().zip(inputs).zip(&buffers) {
            let dims: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
            let value = buffer
                .as_input_value(dims)
                .map_err(RuntimeFailure::recoverable)?;
            values.push((Cow::Borrowed(spec.name.as_str()), value));
        }

        // Round-robin select a session
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session_guard = self.sessions[idx].lock().map_err(|_| {
            RuntimeFailure::fatal(OpaqueError(format!(
                "model '{}': session {}/{} was poisoned by a panicking call",
                self.model_name,
                idx,
                self.sessions.len()
            )))
        })?;

        let ort_inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(values);
        let outputs = session_guard
            .run(ort_inputs)
            .map_err(RuntimeFailure::recoverable)?;

        self.outputs
            .iter()
            .map(|spec| self.extract_output(spec, outputs.get(spec.name.as_str())))
            .collect()
    }
}
