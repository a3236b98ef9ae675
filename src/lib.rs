//! # Print Advisor
//!
//! The inference core of a 3D-print settings recommender. It loads a trained
//! ONNX classifier, owns its native resources, marshals application data into
//! and out of tensors, and serializes concurrent requests from a user-facing
//! surface against the loaded model.
//!
//! ## Features
//!
//! - Model session lifecycle (load, warm-up, run, close) with deterministic release
//! - Dispatcher with bounded concurrency, priorities, deadlines and cancellation
//! - Result cache keyed by input fingerprint and model version
//! - Tensor adapters with explicit numeric coercion rules
//! - OBJ mesh analysis and the recommender's feature vector layout
//! - ONNX Runtime integration, pluggable behind [`core::inference::InferenceRuntime`]
//!
//! ## Modules
//!
//! * [`core`] - Tensors, configuration, errors, runtime integration and the session manager
//! * [`dispatch`] - Request queueing and delivery
//! * [`cache`] - Result cache
//! * [`adapters`] - Domain value to tensor conversion
//! * [`domain`] - Mesh analysis and recommendation decoding
//! * [`advisor`] - The high-level recommender API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use print_advisor::prelude::*;
//!
//! # fn main() -> Result<(), AdvisorError> {
//! let advisor = PrintAdvisor::builder().build("models/basic.onnx")?;
//!
//! let analysis = MeshAnalysis::calculate(&ObjMesh::from_path("bracket.obj")?)?;
//! let profile = RequirementProfile::new(true, false, true, false, true, false, false);
//!
//! advisor
//!     .recommend(&analysis, profile, Priority::High)
//!     .on_complete(|outcome| match outcome.result {
//!         Ok(rec) => println!("{}", rec.format_summary()),
//!         Err(e) => eprintln!("{} error: {e}", e.kind()),
//!     });
//!
//! advisor.close();
//! # Ok(())
//! # }
//! ```
//!
//! ### Lower-level use
//!
//! ```rust,no_run
//! use print_advisor::core::{ElementType, ModelContract, ModelSession, OrtRuntime, SessionConfig, TensorSpec};
//! use print_advisor::dispatch::{Dispatcher, InferenceRequest};
//! use print_advisor::adapters::{FeatureVectorAdapter, TensorAdapter};
//! use print_advisor::core::DispatchConfig;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), print_advisor::core::AdvisorError> {
//! let contract = ModelContract::new(
//!     vec![TensorSpec::new("x", ElementType::Float32, vec![1, 3])],
//!     vec![TensorSpec::new("y", ElementType::Float32, vec![1, 1])],
//! );
//! let session = Arc::new(ModelSession::new(
//!     Arc::new(OrtRuntime::new()),
//!     SessionConfig::new(contract.clone()),
//! )?);
//! session.load(&"models/regressor.onnx".into())?;
//!
//! let dispatcher = Dispatcher::new(Arc::clone(&session), DispatchConfig::new().max_concurrency(2))?;
//! let adapter = FeatureVectorAdapter::new(contract)?;
//! let result = dispatcher
//!     .submit(InferenceRequest::new(adapter.encode(&[0.5, 1.0, 2.0])?))
//!     .wait();
//! let outputs = adapter.decode(&result.into_outcome()?.tensors)?;
//! println!("{:?}", outputs[0]);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod advisor;
pub mod cache;
pub mod core;
pub mod dispatch;
pub mod domain;

#[cfg(test)]
mod test_support;

/// Prelude module for convenient imports.
///
/// ```rust
/// use print_advisor::prelude::*;
/// ```
///
/// Included items cover the recommender workflow: the advisor, mesh analysis,
/// requirement profiles, recommendations, request priorities, configuration
/// and errors. For lower-level control, import from [`core`], [`dispatch`],
/// [`cache`] and [`adapters`] directly.
pub mod prelude {
    pub use crate::advisor::{
        PrintAdvisor, PrintAdvisorBuilder, RecommendationHandle, RecommendationOutcome,
    };
    pub use crate::domain::{MeshAnalysis, ObjMesh, Recommendation, RequirementProfile};

    pub use crate::dispatch::{CancelOutcome, Priority};

    pub use crate::core::config::{CacheConfig, DispatchConfig, OrtSessionConfig, SessionConfig};

    pub use crate::core::{AdvisorError, AdvisorResult, ErrorKind};
}
