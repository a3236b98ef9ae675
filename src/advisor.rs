//! High-level recommender API.
//!
//! [`PrintAdvisor`] wires a [`ModelSession`], a [`Dispatcher`] and the
//! [`RecommendationAdapter`] together. Callers hand in a mesh analysis and a
//! requirement profile and get back a [`RecommendationHandle`] that resolves
//! without blocking the calling thread.

use crate::adapters::TensorAdapter;
use crate::core::config::{DispatchConfig, ModelSource, OrtSessionConfig, SessionConfig};
use crate::core::errors::AdvisorError;
use crate::core::inference::{InferenceRuntime, ModelSession, ModelVersion, OrtRuntime};
use crate::dispatch::{
    CancelOutcome, CorrelationId, DispatchStats, Dispatcher, InferenceHandle, InferenceRequest,
    InferenceResult, Priority, ShutdownMode,
};
use crate::domain::{MeshAnalysis, Recommendation, RecommendationAdapter, RecommendationQuery, RequirementProfile};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for [`PrintAdvisor`].
///
/// # Example
///
/// ```no_run
/// use print_advisor::prelude::*;
///
/// # fn main() -> Result<(), AdvisorError> {
/// let advisor = PrintAdvisor::builder()
///     .dispatch_config(DispatchConfig::new().cache(CacheConfig::entries(64)))
///     .build("models/basic.onnx")?;
///
/// let mesh = ObjMesh::from_path("part.obj")?;
/// let analysis = MeshAnalysis::calculate(&mesh)?;
/// let profile = RequirementProfile::new(true, false, true, false, false, false, false);
/// let recommendation = advisor.recommend_blocking(&analysis, profile)?;
/// println!("{}", recommendation.format_summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PrintAdvisorBuilder {
    runtime: Option<Arc<dyn InferenceRuntime>>,
    adapter: Option<RecommendationAdapter>,
    session_config: Option<SessionConfig>,
    ort_session: Option<OrtSessionConfig>,
    dispatch_config: Option<DispatchConfig>,
}

impl PrintAdvisorBuilder {
    /// Sets the native runtime. Defaults to [`OrtRuntime`].
    pub fn runtime(mut self, runtime: Arc<dyn InferenceRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets the tensor adapter, e.g. one with custom output names.
    pub fn adapter(mut self, adapter: RecommendationAdapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Sets the session configuration. Its contract must equal the adapter's.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = Some(config);
        self
    }

    /// Sets the ONNX Runtime configuration.
    ///
    /// Applies to the default session configuration, or to one given through
    /// [`session_config`](Self::session_config) that carries no ONNX Runtime
    /// settings of its own.
    pub fn ort_session(mut self, config: OrtSessionConfig) -> Self {
        self.ort_session = Some(config);
        self
    }

    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch_config = Some(config);
        self
    }

    /// Loads the model and starts the dispatcher.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid or inconsistent configuration, `ModelLoad` if the
    /// artifact cannot be loaded.
    pub fn build(self, source: impl Into<ModelSource>) -> Result<PrintAdvisor, AdvisorError> {
        let source = source.into();
        let adapter = self.adapter.unwrap_or_default();

        let session_config = match self.session_config {
            Some(mut config) => {
                if &config.contract != adapter.contract() {
                    return Err(AdvisorError::config_error(
                        "session contract differs from the recommendation adapter's contract",
                    ));
                }
                if let Some(ort) = self.ort_session {
                    if config.ort_session.is_some() {
                        return Err(AdvisorError::config_error(
                            "ONNX Runtime settings given both in the session config and through ort_session",
                        ));
                    }
                    config.ort_session = Some(ort);
                }
                config
            }
            None => {
                let mut config = SessionConfig::new(adapter.contract().clone())
                    .model_name("print-advisor");
                config.ort_session = self.ort_session;
                config
            }
        };

        let runtime = self
            .runtime
            .unwrap_or_else(|| Arc::new(OrtRuntime::new()));
        let session = Arc::new(ModelSession::new(runtime, session_config)?);
        let version = session.load(&source)?;
        let dispatcher = Dispatcher::new(
            Arc::clone(&session),
            self.dispatch_config.unwrap_or_default(),
        )?;
        info!(model = %source.describe(), %version, "print advisor ready");

        Ok(PrintAdvisor {
            session,
            dispatcher,
            adapter: Arc::new(adapter),
        })
    }
}

/// Print-settings recommender backed by one model session.
#[derive(Debug)]
pub struct PrintAdvisor {
    session: Arc<ModelSession>,
    dispatcher: Dispatcher,
    adapter: Arc<RecommendationAdapter>,
}

impl PrintAdvisor {
    pub fn builder() -> PrintAdvisorBuilder {
        PrintAdvisorBuilder::default()
    }

    /// Submits a recommendation request without blocking.
    ///
    /// Encoding failures resolve the returned handle immediately.
    pub fn recommend(
        &self,
        analysis: &MeshAnalysis,
        profile: RequirementProfile,
        priority: Priority,
    ) -> RecommendationHandle {
        self.submit(analysis, profile, priority, None)
    }

    /// Like [`recommend`](Self::recommend), with a queue deadline.
    pub fn recommend_within(
        &self,
        analysis: &MeshAnalysis,
        profile: RequirementProfile,
        priority: Priority,
        timeout: Duration,
    ) -> RecommendationHandle {
        self.submit(analysis, profile, priority, Some(timeout))
    }

    /// Submits a request and blocks until it resolves.
    pub fn recommend_blocking(
        &self,
        analysis: &MeshAnalysis,
        profile: RequirementProfile,
    ) -> Result<Recommendation, AdvisorError> {
        self.recommend(analysis, profile, Priority::Normal)
            .wait()
            .into_result()
    }

    fn submit(
        &self,
        analysis: &MeshAnalysis,
        profile: RequirementProfile,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> RecommendationHandle {
        let query = RecommendationQuery::new(analysis.features, profile);
        let inner = match self.adapter.encode(&query) {
            Ok(inputs) => {
                let mut request = InferenceRequest::new(inputs).with_priority(priority);
                if let Some(timeout) = timeout {
                    request = request.with_timeout(timeout);
                }
                self.dispatcher.submit(request)
            }
            Err(error) => InferenceHandle::resolved(InferenceResult::immediate(
                CorrelationId::next(),
                Err(error),
            )),
        };
        RecommendationHandle {
            inner,
            adapter: Arc::clone(&self.adapter),
            profile,
        }
    }

    /// Version of the loaded model, if the session is ready.
    pub fn model_version(&self) -> Option<ModelVersion> {
        self.session.model_version()
    }

    pub fn session(&self) -> &Arc<ModelSession> {
        &self.session
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Runs the queued requests, then closes the session and releases the model.
    pub fn close(&self) {
        self.dispatcher.shutdown(ShutdownMode::Drain);
        self.session.close();
        info!(model = self.session.model_name(), "print advisor closed");
    }
}

/// A pending recommendation.
pub struct RecommendationHandle {
    inner: InferenceHandle,
    adapter: Arc<RecommendationAdapter>,
    profile: RequirementProfile,
}

impl fmt::Debug for RecommendationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecommendationHandle")
            .field("inner", &self.inner)
            .field("profile", &self.profile)
            .finish()
    }
}

/// The resolution of a recommendation request.
#[derive(Debug)]
pub struct RecommendationOutcome {
    pub correlation_id: CorrelationId,
    pub result: Result<Recommendation, AdvisorError>,
    /// Cancellation was requested after dispatch; the result may be discarded.
    pub cancelled: bool,
    /// The request deadline passed while the model was running.
    pub late: bool,
    /// Served from the result cache.
    pub from_cache: bool,
}

impl RecommendationOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Drops the delivery flags, keeping the recommendation or error.
    pub fn into_result(self) -> Result<Recommendation, AdvisorError> {
        self.result
    }
}

fn finish(
    result: InferenceResult,
    adapter: &RecommendationAdapter,
    profile: RequirementProfile,
) -> RecommendationOutcome {
    let InferenceResult {
        correlation_id,
        outcome,
        cancelled,
        late,
        ..
    } = result;
    let from_cache = outcome.as_ref().is_ok_and(|output| output.from_cache);
    let result = outcome.and_then(|output| {
        adapter
            .decode(&output.tensors)?
            .into_recommendation(profile)
    });
    RecommendationOutcome {
        correlation_id,
        result,
        cancelled,
        late,
        from_cache,
    }
}

impl RecommendationHandle {
    pub fn correlation_id(&self) -> CorrelationId {
        self.inner.correlation_id()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }

    /// See [`InferenceHandle::cancel`].
    pub fn cancel(&self) -> CancelOutcome {
        self.inner.cancel()
    }

    /// Blocks until the request resolves.
    pub fn wait(self) -> RecommendationOutcome {
        finish(self.inner.wait(), &self.adapter, self.profile)
    }

    /// Blocks up to `timeout`; gives the handle back if still pending.
    pub fn wait_timeout(self, timeout: Duration) -> Result<RecommendationOutcome, Self> {
        let Self {
            inner,
            adapter,
            profile,
        } = self;
        match inner.wait_timeout(timeout) {
            Ok(result) => Ok(finish(result, &adapter, profile)),
            Err(inner) => Err(Self {
                inner,
                adapter,
                profile,
            }),
        }
    }

    /// Registers a callback that receives the decoded recommendation.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(RecommendationOutcome) + Send + 'static,
    {
        let Self {
            inner,
            adapter,
            profile,
        } = self;
        inner.on_complete(move |result| callback(finish(result, &adapter, profile)));
    }
}
