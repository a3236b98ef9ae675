//! Scripted runtime used by the unit tests.
//!
//! The runtime counts loads and native calls, can hold calls or loads at a gate,
//! injects latency, failures and panics, and tracks how many models are alive so
//! tests can check that native resources are released.

use crate::core::config::{ModelSource, SessionConfig};
use crate::core::errors::{AdvisorError, OpaqueError};
use crate::core::inference::{InferenceRuntime, NativeModel, RuntimeFailure};
use crate::core::tensor::{ElementType, ModelContract, TensorDescriptor, TensorSpec};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const GATE_WAIT_LIMIT: Duration = Duration::from_secs(10);

type Responder = dyn Fn(&[TensorDescriptor], &[TensorSpec]) -> Vec<TensorDescriptor> + Send + Sync;

#[derive(Debug)]
enum Injected {
    Fail { fatal: bool },
    Panic,
}

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    waiting: usize,
}

#[derive(Debug, Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    fn close(&self) {
        self.state.lock().closed = true;
    }

    fn open(&self) {
        self.state.lock().closed = false;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            return;
        }
        state.waiting += 1;
        self.changed.notify_all();
        while state.closed {
            self.changed.wait(&mut state);
        }
        state.waiting -= 1;
    }

    fn wait_for_waiting(&self, n: usize) {
        let deadline = Instant::now() + GATE_WAIT_LIMIT;
        let mut state = self.state.lock();
        while state.waiting < n {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                panic!("only {} of {} calls reached the gate", state.waiting, n);
            }
        }
    }
}

struct Script {
    runs: AtomicUsize,
    loads: AtomicUsize,
    live: AtomicUsize,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    latency: Mutex<Duration>,
    injected: Mutex<VecDeque<Injected>>,
    seen: Mutex<Vec<f32>>,
    run_gate: Gate,
    load_gate: Gate,
    responder: Mutex<Option<Arc<Responder>>>,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("runs", &self.runs)
            .field("loads", &self.loads)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

/// A runtime whose behaviour is scripted by the test.
#[derive(Debug, Clone)]
pub struct ScriptedRuntime {
    script: Arc<Script>,
}

/// Holds calls (or loads) at a gate until released or dropped.
pub struct GateGuard {
    script: Arc<Script>,
    loads: bool,
}

impl GateGuard {
    pub fn release(self) {}
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if self.loads {
            self.script.load_gate.open();
        } else {
            self.script.run_gate.open();
        }
    }
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script {
                runs: AtomicUsize::new(0),
                loads: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
                latency: Mutex::new(Duration::ZERO),
                injected: Mutex::new(VecDeque::new()),
                seen: Mutex::new(Vec::new()),
                run_gate: Gate::default(),
                load_gate: Gate::default(),
                responder: Mutex::new(None),
            }),
        }
    }

    /// Replaces the default echo behaviour with a custom output function.
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&[TensorDescriptor], &[TensorSpec]) -> Vec<TensorDescriptor> + Send + Sync + 'static,
    {
        *self.script.responder.lock() = Some(Arc::new(responder));
        self
    }

    pub fn valid_source() -> ModelSource {
        ModelSource::Bytes(b"scripted-model".to_vec())
    }

    pub fn malformed_source() -> ModelSource {
        ModelSource::Bytes(b"malformed".to_vec())
    }

    /// Native run calls seen by the runtime, warm-up included.
    pub fn runs(&self) -> usize {
        self.script.runs.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.script.loads.load(Ordering::SeqCst)
    }

    /// Models created and not yet dropped.
    pub fn live_models(&self) -> usize {
        self.script.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous native calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.script.max_concurrent.load(Ordering::SeqCst)
    }

    /// First element of the first input of every call, in call order.
    pub fn seen(&self) -> Vec<f32> {
        self.script.seen.lock().clone()
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.script.latency.lock() = latency;
    }

    pub fn fail_next_run(&self, fatal: bool) {
        self.script
            .injected
            .lock()
            .push_back(Injected::Fail { fatal });
    }

    pub fn panic_next_run(&self) {
        self.script.injected.lock().push_back(Injected::Panic);
    }

    pub fn hold_runs(&self) -> GateGuard {
        self.script.run_gate.close();
        GateGuard {
            script: Arc::clone(&self.script),
            loads: false,
        }
    }

    pub fn hold_loads(&self) -> GateGuard {
        self.script.load_gate.close();
        GateGuard {
            script: Arc::clone(&self.script),
            loads: true,
        }
    }

    /// Blocks until `n` calls are waiting at the run gate.
    pub fn wait_for_blocked(&self, n: usize) {
        self.script.run_gate.wait_for_waiting(n);
    }

    /// Blocks until `n` loads are waiting at the load gate.
    pub fn wait_for_blocked_loads(&self, n: usize) {
        self.script.load_gate.wait_for_waiting(n);
    }
}

impl InferenceRuntime for ScriptedRuntime {
    fn load(
        &self,
        source: &ModelSource,
        config: &SessionConfig,
    ) -> Result<Box<dyn NativeModel>, AdvisorError> {
        self.script.load_gate.pass();
        self.script.loads.fetch_add(1, Ordering::SeqCst);
        if let ModelSource::Bytes(bytes) = source
            && bytes.starts_with(b"malformed")
        {
            return Err(AdvisorError::model_load_error(
                source.describe(),
                "artifact is not a valid model",
                None,
                Some(OpaqueError("unexpected header".to_string())),
            ));
        }
        self.script.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            script: Arc::clone(&self.script),
            outputs: config.contract.outputs.clone(),
        }))
    }
}

#[derive(Debug)]
struct ScriptedModel {
    script: Arc<Script>,
    outputs: Vec<TensorSpec>,
}

struct ConcurrencySlot<'a>(&'a Script);

impl Drop for ConcurrencySlot<'_> {
    fn drop(&mut self) {
        self.0.concurrent.fetch_sub(1, Ordering::SeqCst);
    }
}

impl NativeModel for ScriptedModel {
    fn run(&self, inputs: &[TensorDescriptor]) -> Result<Vec<TensorDescriptor>, RuntimeFailure> {
        let script = &self.script;
        script.runs.fetch_add(1, Ordering::SeqCst);
        let now = script.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_concurrent.fetch_max(now, Ordering::SeqCst);
        let _slot = ConcurrencySlot(script);

        if let Some(first) = inputs.first()
            && first.dtype() == ElementType::Float32
            && let Ok(values) = first.to_vec::<f32>()
        {
            script.seen.lock().push(values[0]);
        }

        script.run_gate.pass();
        let latency = *script.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let injected = script.injected.lock().pop_front();
        match injected {
            Some(Injected::Fail { fatal: true }) => {
                return Err(RuntimeFailure::fatal(OpaqueError("device lost".to_string())));
            }
            Some(Injected::Fail { fatal: false }) => {
                return Err(RuntimeFailure::recoverable(OpaqueError(
                    "kernel rejected input".to_string(),
                )));
            }
            Some(Injected::Panic) => panic!("scripted native panic"),
            None => {}
        }

        let responder = script.responder.lock().clone();
        if let Some(responder) = responder {
            return Ok(responder(inputs, &self.outputs));
        }

        Ok(self
            .outputs
            .iter()
            .map(|spec| match inputs.first() {
                Some(first) if first.shape() == spec.shape.as_slice() && first.dtype() == spec.dtype => {
                    first.clone()
                }
                _ => TensorDescriptor::zeros(spec.shape.clone(), spec.dtype)
                    .expect("contract shapes are positive"),
            })
            .collect())
    }
}

impl Drop for ScriptedModel {
    fn drop(&mut self) {
        self.script.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `input: float32 [1, 4] → output: float32 [1, 4]`
pub fn echo_contract() -> ModelContract {
    ModelContract::new(
        vec![TensorSpec::new("input", ElementType::Float32, vec![1, 4])],
        vec![TensorSpec::new("output", ElementType::Float32, vec![1, 4])],
    )
}

pub fn echo_input(values: &[f32]) -> TensorDescriptor {
    TensorDescriptor::from_values(vec![1, 4], values).expect("four values")
}
