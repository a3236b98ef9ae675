//! Model session configuration.

use super::errors::{ConfigError, ConfigValidator};
use super::onnx::OrtSessionConfig;
use crate::core::tensor::ModelContract;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a model artifact is read from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// An artifact on disk.
    Path(PathBuf),
    /// An artifact already held in memory.
    Bytes(Vec<u8>),
}

impl ModelSource {
    /// Short description used in logs and load errors.
    pub fn describe(&self) -> String {
        match self {
            ModelSource::Path(path) => path.display().to_string(),
            ModelSource::Bytes(bytes) => format!("<in-memory model, {} bytes>", bytes.len()),
        }
    }
}

impl std::fmt::Debug for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ModelSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
        }
    }
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::Path(path)
    }
}

impl From<&std::path::Path> for ModelSource {
    fn from(path: &std::path::Path) -> Self {
        ModelSource::Path(path.to_path_buf())
    }
}

impl From<&str> for ModelSource {
    fn from(path: &str) -> Self {
        ModelSource::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for ModelSource {
    fn from(bytes: Vec<u8>) -> Self {
        ModelSource::Bytes(bytes)
    }
}

fn default_model_name() -> String {
    "model".to_string()
}

fn default_warmup() -> bool {
    true
}

fn default_pool_size() -> usize {
    1
}

/// Configuration of one [`ModelSession`](crate::core::inference::ModelSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model name used in logs and errors.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Declared inputs and outputs.
    pub contract: ModelContract,
    /// Run one zero-filled call after load to force lazy allocations.
    #[serde(default = "default_warmup")]
    pub warmup: bool,
    /// Number of native sessions kept by the runtime for concurrent calls (>=1).
    #[serde(default = "default_pool_size")]
    pub session_pool_size: usize,
    /// Label of the model version; the artifact description is used when absent.
    #[serde(default)]
    pub version_label: Option<String>,
    /// ONNX Runtime session configuration for this model (optional)
    #[serde(default)]
    pub ort_session: Option<OrtSessionConfig>,
}

impl SessionConfig {
    /// Creates a configuration for the given contract with default values.
    pub fn new(contract: ModelContract) -> Self {
        Self {
            model_name: default_model_name(),
            contract,
            warmup: default_warmup(),
            session_pool_size: default_pool_size(),
            version_label: None,
            ort_session: None,
        }
    }

    /// Sets the model name.
    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Enables or disables the warm-up call.
    pub fn warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    /// Sets the runtime session pool size.
    pub fn session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = size;
        self
    }

    /// Sets the model version label.
    pub fn version_label(mut self, label: impl Into<String>) -> Self {
        self.version_label = Some(label.into());
        self
    }

    /// Sets the ONNX Runtime session configuration.
    pub fn ort_session(mut self, config: OrtSessionConfig) -> Self {
        self.ort_session = Some(config);
        self
    }
}

impl ConfigValidator for SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "model_name must not be empty".to_string(),
            });
        }
        self.validate_positive_usize(self.session_pool_size, "session_pool_size")?;
        self.validate_tensor_specs(&self.contract.inputs, "input")?;
        self.validate_tensor_specs(&self.contract.outputs, "output")?;

        if let Some(ort) = &self.ort_session {
            if let Some(threads) = ort.intra_threads {
                self.validate_thread_count(threads)?;
            }
            if let Some(threads) = ort.inter_threads {
                self.validate_thread_count(threads)?;
            }
            if let Some(level) = ort.log_severity_level
                && !(0..=4).contains(&level)
            {
                return Err(ConfigError::InvalidConfig {
                    message: format!("log_severity_level must be within 0..=4, got {level}"),
                });
            }
        }
        Ok(())
    }
}
