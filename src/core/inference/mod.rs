//! Model loading and execution.
//!
//! [`backend`] defines the black-box runtime boundary, [`ort_runtime`] implements
//! it on ONNX Runtime and [`session`] manages the lifecycle of one loaded model.

pub mod backend;
pub mod ort_runtime;
pub mod session;

pub use backend::{InferenceRuntime, NativeModel, RuntimeFailure};
pub use ort_runtime::{OrtModel, OrtRuntime};
pub use session::{ModelSession, ModelVersion, SessionState};
