//! Inference requests submitted to the dispatcher.

use crate::core::tensor::TensorDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier that ties a result back to the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

impl CorrelationId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling class of a request. Higher classes are dispatched first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A unit of work: input tensors plus scheduling metadata.
///
/// The request is moved into the dispatcher on submission and cannot be
/// changed afterwards.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    correlation_id: CorrelationId,
    inputs: Vec<TensorDescriptor>,
    priority: Priority,
    timeout: Option<Duration>,
}

impl InferenceRequest {
    /// Creates a normal-priority request with a fresh correlation id.
    pub fn new(inputs: Vec<TensorDescriptor>) -> Self {
        Self {
            correlation_id: CorrelationId::next(),
            inputs,
            priority: Priority::Normal,
            timeout: None,
        }
    }

    /// Uses a caller-supplied correlation id.
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Maximum time the request may wait in the queue before dispatch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn inputs(&self) -> &[TensorDescriptor] {
        &self.inputs
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn into_inputs(self) -> Vec<TensorDescriptor> {
        self.inputs
    }
}
