//! Error type definitions for the inference core.

use crate::core::config::ConfigError;
use crate::core::tensor::ElementType;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`AdvisorError`].
///
/// The presentation layer renders errors by kind; the kind also decides whether
/// the failure is attributable to the caller, the model artifact or the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Loading the model artifact failed.
    ModelLoad,
    /// Input did not fit the declared input shape.
    ShapeMismatch,
    /// Numeric coercion would have lost precision.
    TypeConversion,
    /// The runtime produced an output inconsistent with the output contract.
    UnexpectedShape,
    /// The native runtime failed while executing a call.
    Inference,
    /// The session is closing or closed.
    SessionClosed,
    /// The session has no model loaded yet.
    SessionNotReady,
    /// The requested lifecycle operation is not valid in the current state.
    InvalidState,
    /// The request expired while queued.
    Timeout,
    /// The request was cancelled before dispatch.
    Cancelled,
    /// Invalid caller input outside of tensor coercion.
    InvalidInput,
    /// Invalid configuration.
    Config,
    /// Wrapped I/O, image or tensor layout failure.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ModelLoad => "model load",
            ErrorKind::ShapeMismatch => "shape mismatch",
            ErrorKind::TypeConversion => "type conversion",
            ErrorKind::UnexpectedShape => "unexpected shape",
            ErrorKind::Inference => "inference",
            ErrorKind::SessionClosed => "session closed",
            ErrorKind::SessionNotReady => "session not ready",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Config => "configuration",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Errors produced by the inference core.
///
/// Every submitted request resolves to exactly one value of either its outputs or
/// one of these errors; errors are never shared between requests.
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// The model artifact could not be turned into a ready session.
    #[error("failed to load model '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path or description of the artifact.
        model_path: String,
        /// Short reason description.
        reason: String,
        /// Optional suggestion, already formatted with its prefix.
        suggestion: String,
        /// Underlying runtime error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A tensor does not match the declared fixed shape.
    #[error("shape mismatch for '{tensor}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Name of the tensor being encoded or validated.
        tensor: String,
        /// Declared shape.
        expected: Vec<usize>,
        /// Shape (or element count as a 1-D shape) actually supplied.
        actual: Vec<usize>,
    },

    /// Numeric coercion would silently lose precision.
    #[error("cannot convert element {index} of '{tensor}' to {target}: {reason}")]
    TypeConversion {
        /// Name of the tensor being encoded or validated.
        tensor: String,
        /// Target element type.
        target: ElementType,
        /// Offending element index.
        index: usize,
        /// Why the conversion was rejected.
        reason: String,
    },

    /// The runtime returned an output inconsistent with the output contract.
    #[error("unexpected output '{output}': expected {expected}, got {actual}")]
    UnexpectedShape {
        /// Output name.
        output: String,
        /// Declared output description.
        expected: String,
        /// Received output description.
        actual: String,
    },

    /// The native runtime failed during a call.
    #[error(
        "inference failed for model '{model_name}' during {operation} (input shapes: {input_shapes:?}){}: {context}",
        fatal_suffix(.fatal)
    )]
    Inference {
        /// Model name.
        model_name: String,
        /// The operation that failed.
        operation: String,
        /// Shapes of the supplied inputs.
        input_shapes: Vec<Vec<usize>>,
        /// Free-form context.
        context: String,
        /// Whether the runtime reported the session as unusable.
        fatal: bool,
        /// Native cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The session no longer admits calls.
    #[error("session for model '{model_name}' is {state}")]
    SessionClosed {
        /// Model name.
        model_name: String,
        /// Lifecycle state at rejection time.
        state: String,
    },

    /// The session has no ready model.
    #[error("session is not ready (state: {state})")]
    SessionNotReady {
        /// Lifecycle state at rejection time.
        state: String,
    },

    /// A lifecycle operation was requested in a state that does not allow it.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Requested operation.
        operation: String,
        /// Lifecycle state at request time.
        state: String,
    },

    /// The request's deadline passed before it was dispatched.
    #[error("request {correlation_id} timed out after {waited:?} in queue")]
    Timeout {
        /// Correlation id of the expired request.
        correlation_id: u64,
        /// Time spent queued.
        waited: Duration,
    },

    /// The request was cancelled before dispatch.
    #[error("request {correlation_id} was cancelled before dispatch")]
    Cancelled {
        /// Correlation id of the cancelled request.
        correlation_id: u64,
    },

    /// Invalid input outside of tensor coercion.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// A configuration problem detected at runtime.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Configuration validation failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error from the ONNX Runtime bindings.
    #[error(transparent)]
    Runtime(#[from] ort::Error),

    /// Error from ndarray layout conversions.
    #[error("tensor layout")]
    TensorLayout(#[from] ndarray::ShapeError),

    /// Error from image decoding.
    #[error("image")]
    Image(#[from] image::ImageError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdvisorError::ModelLoad { .. } => ErrorKind::ModelLoad,
            AdvisorError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            AdvisorError::TypeConversion { .. } => ErrorKind::TypeConversion,
            AdvisorError::UnexpectedShape { .. } => ErrorKind::UnexpectedShape,
            AdvisorError::Inference { .. } | AdvisorError::Runtime(_) => ErrorKind::Inference,
            AdvisorError::SessionClosed { .. } => ErrorKind::SessionClosed,
            AdvisorError::SessionNotReady { .. } => ErrorKind::SessionNotReady,
            AdvisorError::InvalidState { .. } => ErrorKind::InvalidState,
            AdvisorError::Timeout { .. } => ErrorKind::Timeout,
            AdvisorError::Cancelled { .. } => ErrorKind::Cancelled,
            AdvisorError::InvalidInput { .. } => ErrorKind::InvalidInput,
            AdvisorError::ConfigError { .. } | AdvisorError::Config(_) => ErrorKind::Config,
            AdvisorError::TensorLayout(_) | AdvisorError::Image(_) | AdvisorError::Io(_) => {
                ErrorKind::Io
            }
        }
    }

    /// Returns true if the error was caused by the request's own input rather
    /// than by the session or runtime.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ShapeMismatch | ErrorKind::TypeConversion | ErrorKind::InvalidInput
        )
    }

    /// Returns true if the runtime reported the session as unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdvisorError::Inference { fatal: true, .. })
    }
}

fn fatal_suffix(fatal: &bool) -> &'static str {
    if *fatal { " [unrecoverable]" } else { "" }
}

/// An error carrying only a message, for wrapping causes that have no error type.
#[derive(Debug)]
pub struct OpaqueError(pub String);

impl std::fmt::Display for OpaqueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for OpaqueError {}
