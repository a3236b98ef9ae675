//! Configuration for model sessions, the dispatcher and the result cache.
//!
//! All types are plain `serde` structs so an external collaborator can read
//! them from whatever format it prefers; each one is checked through
//! [`ConfigValidator`] before use.

pub mod dispatch;
pub mod errors;
pub mod onnx;
pub mod session;

// Re-export commonly used types
pub use dispatch::{CacheCapacity, CacheConfig, DispatchConfig};
pub use errors::{ConfigError, ConfigValidator, ConfigValidatorExt};
pub use onnx::*;
pub use session::{ModelSource, SessionConfig};
