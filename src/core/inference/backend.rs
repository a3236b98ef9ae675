//! The boundary between the session manager and a native inference runtime.
//!
//! The runtime is a black box with the contract
//! load model → create session → run(inputs) → outputs → close.
//! Closing is dropping the [`NativeModel`].

use crate::core::config::{ModelSource, SessionConfig};
use crate::core::errors::AdvisorError;
use crate::core::tensor::TensorDescriptor;
use std::fmt;

/// A native runtime able to turn a model artifact into a runnable model.
pub trait InferenceRuntime: Send + Sync + fmt::Debug {
    /// Loads the artifact and creates its native session(s).
    ///
    /// Any partially created native resources must be released before an error
    /// is returned.
    fn load(
        &self,
        source: &ModelSource,
        config: &SessionConfig,
    ) -> Result<Box<dyn NativeModel>, AdvisorError>;
}

/// A loaded model owning native resources; dropping it releases them.
pub trait NativeModel: Send + Sync + fmt::Debug {
    /// Runs one synchronous forward pass.
    ///
    /// Inputs are in contract order and already validated against the contract.
    /// Outputs are returned in contract order.
    fn run(&self, inputs: &[TensorDescriptor]) -> Result<Vec<TensorDescriptor>, RuntimeFailure>;
}

/// A failure reported by the native runtime during a call.
#[derive(Debug)]
pub struct RuntimeFailure {
    /// The runtime reports the session as unusable after this failure.
    pub fatal: bool,
    /// Native cause.
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl RuntimeFailure {
    /// A failure limited to the current call.
    pub fn recoverable(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            fatal: false,
            source: source.into(),
        }
    }

    /// A failure after which the session cannot serve further calls.
    pub fn fatal(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            fatal: true,
            source: source.into(),
        }
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "unrecoverable runtime failure: {}", self.source)
        } else {
            write!(f, "runtime failure: {}", self.source)
        }
    }
}
