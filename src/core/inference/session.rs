//! Lifecycle management of one loaded model.
//!
//! A [`ModelSession`] moves through `Unloaded → Loading → Ready → Closing → Closed`.
//! It exclusively owns the native model handle; calls borrow it through an
//! in-flight guard and the handle is released only once the last admitted call
//! has returned.

use super::backend::{InferenceRuntime, NativeModel};
use crate::core::config::{ConfigValidatorExt, ModelSource, SessionConfig};
use crate::core::errors::AdvisorError;
use crate::core::tensor::{ModelContract, TensorDescriptor};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle state of a [`ModelSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unloaded,
    Loading,
    Ready,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unloaded => "unloaded",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identity of one successful load.
///
/// Two loads of the same artifact still produce different versions, so results
/// cached for one load are never served for another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelVersion {
    label: Arc<str>,
    generation: u64,
}

impl ModelVersion {
    pub(crate) fn next(label: &str) -> Self {
        Self {
            label: Arc::from(label),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Human readable label of the loaded artifact.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Process-unique load generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.generation)
    }
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    handle: Option<Arc<dyn NativeModel>>,
    in_flight: usize,
    version: Option<ModelVersion>,
    close_requested: bool,
}

/// Owner of one model's native resources.
#[derive(Debug)]
pub struct ModelSession {
    runtime: Arc<dyn InferenceRuntime>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    state_changed: Condvar,
    native_calls: AtomicU64,
}

impl ModelSession {
    /// Creates an unloaded session after validating its configuration.
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        config: SessionConfig,
    ) -> Result<Self, AdvisorError> {
        let config = config.validated()?;
        Ok(Self {
            runtime,
            config,
            inner: Mutex::new(Inner {
                state: SessionState::Unloaded,
                handle: None,
                in_flight: 0,
                version: None,
                close_requested: false,
            }),
            state_changed: Condvar::new(),
            native_calls: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Model name from the configuration.
    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// Declared input and output contract.
    pub fn contract(&self) -> &ModelContract {
        &self.config.contract
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Version of the currently loaded model, if any.
    pub fn model_version(&self) -> Option<ModelVersion> {
        self.inner.lock().version.clone()
    }

    /// Number of admitted calls that have not returned yet.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Number of native run calls issued for callers. Warm-up is not counted.
    pub fn native_calls(&self) -> u64 {
        self.native_calls.load(Ordering::Acquire)
    }

    fn transition(&self, inner: &mut Inner, to: SessionState) {
        tracing::debug!(
            model = %self.config.model_name,
            from = %inner.state,
            to = %to,
            "session state transition"
        );
        inner.state = to;
        self.state_changed.notify_all();
    }

    /// Loads the model and makes the session ready.
    ///
    /// Valid only from `Unloaded`. A failed load (including a failed warm-up)
    /// returns `ModelLoad` and leaves the session `Unloaded`, so a later load of
    /// a valid artifact succeeds. If `close` was requested while loading, the
    /// freshly created handle is released and `SessionClosed` is returned.
    pub fn load(&self, source: &ModelSource) -> Result<ModelVersion, AdvisorError> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Unloaded {
                return Err(AdvisorError::invalid_state("load", inner.state));
            }
            inner.close_requested = false;
            self.transition(&mut inner, SessionState::Loading);
        }

        let location = source.describe();
        tracing::info!(model = %self.config.model_name, source = %location, "loading model");
        let started = Instant::now();

        let mut attempt = LoadAttempt {
            session: self,
            armed: true,
        };
        let result = self
            .runtime
            .load(source, &self.config)
            .and_then(|model| self.warm_up(model.as_ref(), &location).map(|_| model));

        let mut inner = self.inner.lock();
        attempt.armed = false;
        match result {
            Err(e) => {
                tracing::warn!(
                    model = %self.config.model_name,
                    source = %location,
                    error = %e,
                    "model load failed"
                );
                let next = if inner.close_requested {
                    SessionState::Closed
                } else {
                    SessionState::Unloaded
                };
                self.transition(&mut inner, next);
                Err(e)
            }
            Ok(model) if inner.close_requested => {
                self.transition(&mut inner, SessionState::Closed);
                drop(inner);
                drop(model);
                tracing::info!(
                    model = %self.config.model_name,
                    "session closed while loading; released model"
                );
                Err(AdvisorError::session_closed(
                    &self.config.model_name,
                    SessionState::Closed,
                ))
            }
            Ok(model) => {
                let label = self.config.version_label.as_deref().unwrap_or(&location);
                let version = ModelVersion::next(label);
                inner.handle = Some(Arc::from(model));
                inner.version = Some(version.clone());
                self.transition(&mut inner, SessionState::Ready);
                tracing::info!(
                    model = %self.config.model_name,
                    version = %version,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "model ready"
                );
                Ok(version)
            }
        }
    }

    fn warm_up(&self, model: &dyn NativeModel, location: &str) -> Result<(), AdvisorError> {
        if !self.config.warmup {
            return Ok(());
        }
        tracing::debug!(model = %self.config.model_name, "running warm-up call");
        let inputs = self.config.contract.zero_inputs()?;
        let outputs = model.run(&inputs).map_err(|failure| {
            AdvisorError::model_load_error(
                location,
                "warm-up call failed",
                Some("check that the artifact matches the declared input contract"),
                Some(failure.source),
            )
        })?;
        self.config.contract.check_outputs(&outputs).map_err(|e| {
            AdvisorError::model_load_error(
                location,
                "warm-up output does not match the declared output contract",
                None,
                Some(e),
            )
        })
    }

    /// Runs one inference call on the calling thread.
    pub fn run(&self, inputs: &[TensorDescriptor]) -> Result<Arc<[TensorDescriptor]>, AdvisorError> {
        self.run_versioned(inputs).map(|(outputs, _)| outputs)
    }

    /// Runs one inference call and reports the model version that served it.
    ///
    /// Inputs are validated against the contract before the native call;
    /// outputs are validated after it.
    pub fn run_versioned(
        &self,
        inputs: &[TensorDescriptor],
    ) -> Result<(Arc<[TensorDescriptor]>, ModelVersion), AdvisorError> {
        let (guard, version) = self.admit()?;
        self.config.contract.check_inputs(inputs)?;

        let Some(handle) = guard.handle.as_ref() else {
            return Err(AdvisorError::session_not_ready(SessionState::Unloaded));
        };
        self.native_calls.fetch_add(1, Ordering::AcqRel);
        let outputs = match handle.run(inputs) {
            Ok(outputs) => outputs,
            Err(failure) => {
                let fatal = failure.fatal;
                if fatal {
                    tracing::error!(
                        model = %self.config.model_name,
                        error = %failure,
                        "unrecoverable runtime failure; closing session"
                    );
                    self.begin_close();
                }
                return Err(AdvisorError::inference_error_builder(
                    &self.config.model_name,
                    "forward_pass",
                )
                .input_shapes(inputs.iter().map(|t| t.shape().to_vec()).collect())
                .context(format!("native run failed for model version {version}"))
                .fatal(fatal)
                .build(failure.source));
            }
        };
        drop(guard);

        self.config.contract.check_outputs(&outputs)?;
        Ok((Arc::from(outputs), version))
    }

    fn admit(&self) -> Result<(InFlightGuard<'_>, ModelVersion), AdvisorError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Ready => {}
            state @ (SessionState::Closing | SessionState::Closed) => {
                return Err(AdvisorError::session_closed(&self.config.model_name, state));
            }
            state @ (SessionState::Unloaded | SessionState::Loading) => {
                return Err(AdvisorError::session_not_ready(state));
            }
        }
        let (Some(handle), Some(version)) = (inner.handle.clone(), inner.version.clone()) else {
            return Err(AdvisorError::session_not_ready(inner.state));
        };
        inner.in_flight += 1;
        Ok((
            InFlightGuard {
                session: self,
                handle: Some(handle),
            },
            version,
        ))
    }

    /// Starts closing without waiting and returns the resulting state.
    ///
    /// `Ready` moves to `Closing` and then to `Closed` once the in-flight count
    /// reaches zero. `Unloaded` closes immediately. A close during `Loading` is
    /// honoured when the load finishes.
    pub fn begin_close(&self) -> SessionState {
        let mut released = None;
        let state = {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Unloaded => self.transition(&mut inner, SessionState::Closed),
                SessionState::Loading => inner.close_requested = true,
                SessionState::Ready if inner.in_flight == 0 => {
                    released = inner.handle.take();
                    self.transition(&mut inner, SessionState::Closed);
                }
                SessionState::Ready => self.transition(&mut inner, SessionState::Closing),
                SessionState::Closing | SessionState::Closed => {}
            }
            inner.state
        };
        if released.is_some() {
            drop(released);
            tracing::info!(model = %self.config.model_name, "model handle released");
        }
        state
    }

    /// Closes the session and blocks until it is `Closed`.
    pub fn close(&self) {
        self.begin_close();
        let mut inner = self.inner.lock();
        while inner.state != SessionState::Closed {
            self.state_changed.wait(&mut inner);
        }
    }

    /// Waits up to `timeout` for the session to reach `Closed`.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state != SessionState::Closed {
            if self
                .state_changed
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return inner.state == SessionState::Closed;
            }
        }
        true
    }

    /// Re-arms a closed session for another load.
    pub fn reset(&self) -> Result<(), AdvisorError> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Closed {
            return Err(AdvisorError::invalid_state("reset", inner.state));
        }
        inner.version = None;
        inner.close_requested = false;
        self.transition(&mut inner, SessionState::Unloaded);
        Ok(())
    }
}

/// Accounts for one admitted call; decrements the in-flight count on every exit path.
struct InFlightGuard<'a> {
    session: &'a ModelSession,
    handle: Option<Arc<dyn NativeModel>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // The borrowed handle must go before the session may release its own.
        drop(self.handle.take());

        let session = self.session;
        let released = {
            let mut inner = session.inner.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
            if inner.in_flight == 0 && inner.state == SessionState::Closing {
                let released = inner.handle.take();
                session.transition(&mut inner, SessionState::Closed);
                released
            } else {
                None
            }
        };
        if released.is_some() {
            drop(released);
            tracing::info!(model = %session.config.model_name, "drained; model handle released");
        }
    }
}

/// Restores a consistent state if loading unwinds.
struct LoadAttempt<'a> {
    session: &'a ModelSession,
    armed: bool,
}

impl Drop for LoadAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.session.inner.lock();
            let next = if inner.close_requested {
                SessionState::Closed
            } else {
                SessionState::Unloaded
            };
            self.session.transition(&mut inner, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::test_support::{ScriptedRuntime, echo_contract, echo_input};
    use std::thread;

    fn session_with(runtime: &ScriptedRuntime, warmup: bool) -> ModelSession {
        let config = SessionConfig::new(echo_contract())
            .model_name("echo")
            .warmup(warmup);
        ModelSession::new(Arc::new(runtime.clone()), config).unwrap()
    }

    #[test]
    fn test_load_run_close() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, true);
        assert_eq!(session.state(), SessionState::Unloaded);

        let version = session.load(&ScriptedRuntime::valid_source()).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.model_version(), Some(version));
        // Warm-up reached the runtime but is not a caller call.
        assert_eq!(runtime.runs(), 1);
        assert_eq!(session.native_calls(), 0);

        let input = echo_input(&[1.0, 2.0, 3.0, 4.0]);
        let outputs = session.run(std::slice::from_ref(&input)).unwrap();
        assert_eq!(outputs[0], input);
        assert_eq!(session.native_calls(), 1);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(runtime.live_models(), 0);
    }

    #[test]
    fn test_malformed_model_then_valid_load() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);

        let err = session.load(&ScriptedRuntime::malformed_source()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelLoad);
        assert_eq!(session.state(), SessionState::Unloaded);
        assert_eq!(runtime.live_models(), 0);

        assert!(session.load(&ScriptedRuntime::valid_source()).is_ok());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_failed_warm_up_is_a_load_failure() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, true);
        runtime.fail_next_run(false);

        let err = session.load(&ScriptedRuntime::valid_source()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelLoad);
        assert_eq!(session.state(), SessionState::Unloaded);
        assert_eq!(runtime.live_models(), 0);
    }

    #[test]
    fn test_load_outside_unloaded_is_invalid() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        session.load(&ScriptedRuntime::valid_source()).unwrap();

        let err = session.load(&ScriptedRuntime::valid_source()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_run_rejections_by_state() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        let input = echo_input(&[0.0; 4]);

        let err = session.run(std::slice::from_ref(&input)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionNotReady);

        session.load(&ScriptedRuntime::valid_source()).unwrap();
        session.close();
        let err = session.run(std::slice::from_ref(&input)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
        assert_eq!(runtime.runs(), 0);
    }

    #[test]
    fn test_input_validation_happens_before_native_call() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        session.load(&ScriptedRuntime::valid_source()).unwrap();

        let wrong_shape = TensorDescriptor::from_values(vec![2, 2], &[0.0f32; 4]).unwrap();
        let err = session.run(&[wrong_shape]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);

        let wrong_type = TensorDescriptor::from_values(vec![1, 4], &[0i64; 4]).unwrap();
        let err = session.run(&[wrong_type]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeConversion);

        assert_eq!(session.native_calls(), 0);
        assert_eq!(session.in_flight(), 0);
    }

    #[test]
    fn test_close_waits_for_in_flight_call() {
        let runtime = ScriptedRuntime::new();
        let session = Arc::new(session_with(&runtime, false));
        session.load(&ScriptedRuntime::valid_source()).unwrap();
        let gate = runtime.hold_runs();

        let worker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.run(&[echo_input(&[5.0; 4])]))
        };
        runtime.wait_for_blocked(1);

        assert_eq!(session.begin_close(), SessionState::Closing);
        assert_eq!(session.in_flight(), 1);
        assert_eq!(runtime.live_models(), 1);
        let err = session.run(&[echo_input(&[0.0; 4])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);

        gate.release();
        let admitted = worker.join().unwrap();
        assert!(admitted.is_ok());
        assert!(session.wait_closed(Duration::from_secs(5)));
        assert_eq!(runtime.live_models(), 0);
    }

    #[test]
    fn test_fatal_failure_closes_session() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        session.load(&ScriptedRuntime::valid_source()).unwrap();
        runtime.fail_next_run(true);

        let err = session.run(&[echo_input(&[1.0; 4])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(err.is_fatal());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(runtime.live_models(), 0);
    }

    #[test]
    fn test_recoverable_failure_keeps_session_ready() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        session.load(&ScriptedRuntime::valid_source()).unwrap();
        runtime.fail_next_run(false);

        let err = session.run(&[echo_input(&[1.0; 4])]).unwrap_err();
        assert!(!err.is_fatal());
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.run(&[echo_input(&[1.0; 4])]).is_ok());
    }

    #[test]
    fn test_panicking_call_releases_in_flight_slot() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        session.load(&ScriptedRuntime::valid_source()).unwrap();
        runtime.panic_next_run();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            session.run(&[echo_input(&[1.0; 4])])
        }));
        assert!(outcome.is_err());
        assert_eq!(session.in_flight(), 0);

        session.close();
        assert_eq!(runtime.live_models(), 0);
    }

    #[test]
    fn test_close_during_loading() {
        let runtime = ScriptedRuntime::new();
        let session = Arc::new(session_with(&runtime, false));
        let gate = runtime.hold_loads();

        let loader = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.load(&ScriptedRuntime::valid_source()))
        };
        runtime.wait_for_blocked_loads(1);
        assert_eq!(session.state(), SessionState::Loading);
        assert_eq!(session.begin_close(), SessionState::Loading);

        gate.release();
        let err = loader.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(runtime.live_models(), 0);
    }

    #[test]
    fn test_reset_and_reload_gives_new_version() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        let first = session.load(&ScriptedRuntime::valid_source()).unwrap();

        assert_eq!(session.reset().unwrap_err().kind(), ErrorKind::InvalidState);
        session.close();
        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Unloaded);

        let second = session.load(&ScriptedRuntime::valid_source()).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.label(), second.label());
    }

    #[test]
    fn test_close_from_unloaded() {
        let runtime = ScriptedRuntime::new();
        let session = session_with(&runtime, false);
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
