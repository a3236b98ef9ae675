//! Results delivered to submitters.

use super::request::CorrelationId;
use crate::core::errors::AdvisorError;
use crate::core::inference::ModelVersion;
use crate::core::tensor::TensorDescriptor;
use std::sync::Arc;
use std::time::Duration;

/// Outputs of a successful request.
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    /// Output tensors in contract order.
    pub tensors: Arc<[TensorDescriptor]>,
    /// The model version that produced the outputs.
    pub model_version: ModelVersion,
    /// Served from the result cache without a native call.
    pub from_cache: bool,
}

/// The single resolution of a submitted request.
#[derive(Debug)]
pub struct InferenceResult {
    pub correlation_id: CorrelationId,
    pub outcome: Result<InferenceOutput, AdvisorError>,
    /// Cancellation was requested after the request had been dispatched.
    pub cancelled: bool,
    /// The queue deadline passed while the native call was running.
    pub late: bool,
    /// Time between submission and dispatch (or resolution, if never dispatched).
    pub queued_for: Duration,
    /// Time spent in the native call.
    pub ran_for: Duration,
}

impl InferenceResult {
    pub(crate) fn immediate(
        correlation_id: CorrelationId,
        outcome: Result<InferenceOutput, AdvisorError>,
    ) -> Self {
        Self {
            correlation_id,
            outcome,
            cancelled: false,
            late: false,
            queued_for: Duration::ZERO,
            ran_for: Duration::ZERO,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Consumes the result, keeping only the outcome.
    pub fn into_outcome(self) -> Result<InferenceOutput, AdvisorError> {
        self.outcome
    }
}

/// What a cancellation request achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed from the queue; resolves to `Cancelled` and never runs.
    Dequeued,
    /// Already dispatched; its result will carry `cancelled = true`.
    InFlight,
    /// Already resolved; nothing changed.
    AlreadyComplete,
}
