//! Error types for the inference core.
//!
//! This module provides the error taxonomy shared by the tensor adapters, the
//! model session manager and the dispatcher, together with helper constructors
//! for building well-structured errors with context and error chaining.
//!
//! # Usage
//!
//! ```rust
//! use print_advisor::core::errors::{AdvisorError, ErrorKind};
//!
//! let error = AdvisorError::session_closed("basic", "closing");
//! assert_eq!(error.kind(), ErrorKind::SessionClosed);
//!
//! let error = AdvisorError::config_error("max_concurrency must be at least 1");
//! assert_eq!(error.kind(), ErrorKind::Config);
//! ```

pub mod constructors;
pub mod types;

pub use constructors::InferenceErrorBuilder;
pub use types::{AdvisorError, ErrorKind, OpaqueError};

/// Convenient result alias for inference core operations.
pub type AdvisorResult<T> = Result<T, AdvisorError>;
