//! Error constructor utilities for the inference core.
//!
//! These helpers keep error construction consistent across the session manager,
//! the dispatcher and the tensor adapters:
//!
//! ```rust
//! use print_advisor::core::errors::AdvisorError;
//!
//! let error = AdvisorError::shape_mismatch("input", &[1, 20], &[1, 19]);
//! assert_eq!(
//!     error.to_string(),
//!     "shape mismatch for 'input': expected [1, 20], got [1, 19]"
//! );
//! ```

use super::types::{AdvisorError, OpaqueError};
use crate::core::tensor::ElementType;
use std::time::Duration;

/// Builder for composing detailed `Inference` errors without duplicating boilerplate.
#[derive(Clone, Debug)]
pub struct InferenceErrorBuilder {
    model_name: String,
    operation: String,
    input_shapes: Vec<Vec<usize>>,
    context: String,
    fatal: bool,
}

impl InferenceErrorBuilder {
    /// Creates a new builder with the required model metadata.
    pub fn new(model_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            operation: operation.into(),
            input_shapes: Vec::new(),
            context: String::new(),
            fatal: false,
        }
    }

    /// Stores the input tensor shapes for contextual debugging.
    pub fn input_shapes(mut self, shapes: Vec<Vec<usize>>) -> Self {
        self.input_shapes = shapes;
        self
    }

    /// Adds free-form context to the error message.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Marks the failure as unrecoverable for the session.
    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    /// Consumes the builder and produces the final error.
    pub fn build(self, error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> AdvisorError {
        AdvisorError::Inference {
            model_name: self.model_name,
            operation: self.operation,
            input_shapes: self.input_shapes,
            context: self.context,
            fatal: self.fatal,
            source: error.into(),
        }
    }
}

impl AdvisorError {
    /// Creates an error for model load failures with contextual suggestions.
    ///
    /// # Arguments
    /// * `model_path` - Path or description of the artifact
    /// * `reason` - Short reason description
    /// * `suggestion` - Optional suggestion message (without punctuation)
    /// * `source` - Optional underlying error
    pub fn model_load_error(
        model_path: impl Into<String>,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<impl Into<Box<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        let suggestion = suggestion
            .map(|s| format!("; suggested fix: {}", s))
            .unwrap_or_default();
        Self::ModelLoad {
            model_path: model_path.into(),
            reason: reason.into(),
            suggestion,
            source: source.map(Into::into),
        }
    }

    /// Creates a builder for inference errors with optional context pieces.
    pub fn inference_error_builder(
        model_name: impl Into<String>,
        operation: impl Into<String>,
    ) -> InferenceErrorBuilder {
        InferenceErrorBuilder::new(model_name, operation)
    }

    /// Creates an inference error from a plain message.
    pub fn inference_message(model_name: &str, operation: &str, message: impl Into<String>) -> Self {
        Self::inference_error_builder(model_name, operation).build(OpaqueError(message.into()))
    }

    /// Creates a shape mismatch error.
    pub fn shape_mismatch(tensor: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            tensor: tensor.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a type conversion error for a single element.
    pub fn type_conversion(
        tensor: impl Into<String>,
        target: ElementType,
        index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::TypeConversion {
            tensor: tensor.into(),
            target,
            index,
            reason: reason.into(),
        }
    }

    /// Creates an error for an output that violates the output contract.
    pub fn unexpected_shape(
        output: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::UnexpectedShape {
            output: output.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a rejection for a closing or closed session.
    pub fn session_closed(model_name: impl Into<String>, state: impl std::fmt::Display) -> Self {
        Self::SessionClosed {
            model_name: model_name.into(),
            state: state.to_string(),
        }
    }

    /// Creates a rejection for a session without a ready model.
    pub fn session_not_ready(state: impl std::fmt::Display) -> Self {
        Self::SessionNotReady {
            state: state.to_string(),
        }
    }

    /// Creates an error for a lifecycle operation requested in the wrong state.
    pub fn invalid_state(operation: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            state: state.to_string(),
        }
    }

    /// Creates a queue-time expiry error.
    pub fn timeout(correlation_id: u64, waited: Duration) -> Self {
        Self::Timeout {
            correlation_id,
            waited,
        }
    }

    /// Creates a pre-dispatch cancellation error.
    pub fn cancelled(correlation_id: u64) -> Self {
        Self::Cancelled { correlation_id }
    }

    /// Creates an error for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an error for configuration problems detected at runtime.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates a configuration error with field context.
    pub fn config_error_with_context(field: &str, value: &str, reason: &str) -> Self {
        Self::ConfigError {
            message: format!(
                "Configuration error in field '{field}' with value '{value}': {reason}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;

    #[test]
    fn test_model_load_error_formats_suggestion() {
        let error = AdvisorError::model_load_error(
            "models/basic.onnx",
            "failed to create ONNX session",
            Some("verify model file exists and is readable"),
            None::<std::io::Error>,
        );

        assert_eq!(
            error.to_string(),
            "failed to load model 'models/basic.onnx': failed to create ONNX session; suggested fix: verify model file exists and is readable"
        );
        assert_eq!(error.kind(), ErrorKind::ModelLoad);
    }

    #[test]
    fn test_inference_builder_keeps_cause() {
        let error = AdvisorError::inference_error_builder("basic", "forward_pass")
            .input_shapes(vec![vec![1, 20]])
            .context("runtime rejected input")
            .fatal(true)
            .build(std::io::Error::other("device lost"));

        assert!(error.is_fatal());
        assert_eq!(error.kind(), ErrorKind::Inference);
        let source = std::error::Error::source(&error).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("device lost"));
        assert!(error.to_string().contains("[unrecoverable]"));
    }

    #[test]
    fn test_caller_errors() {
        assert!(AdvisorError::shape_mismatch("input", &[1, 20], &[3]).is_caller_error());
        assert!(
            AdvisorError::type_conversion("input", ElementType::Int64, 2, "fractional value")
                .is_caller_error()
        );
        assert!(!AdvisorError::timeout(7, Duration::from_millis(5)).is_caller_error());
        assert!(!AdvisorError::session_closed("basic", "closed").is_caller_error());
    }
}
