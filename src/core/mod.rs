//! The core of the inference stack.
//!
//! This module contains the fundamental components shared by the dispatcher,
//! the cache and the adapters:
//! - Tensor descriptors and model contracts
//! - Configuration management
//! - Error handling
//! - Runtime integration and the model session lifecycle
//! - Input validation helpers

pub mod config;
pub mod errors;
pub mod inference;
pub mod tensor;
pub mod validation;

pub use config::{
    CacheCapacity, CacheConfig, ConfigError, ConfigValidator, DispatchConfig, ModelSource,
    SessionConfig,
};
pub use errors::{AdvisorError, AdvisorResult, ErrorKind};
pub use inference::{InferenceRuntime, ModelSession, ModelVersion, OrtRuntime, SessionState};
pub use tensor::{ElementType, ModelContract, TensorDescriptor, TensorSpec};

/// Initializes the tracing subscriber for logging.
///
/// This function sets up the tracing subscriber with environment filter and formatting layer.
/// It's typically called at the start of an application to enable logging.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
