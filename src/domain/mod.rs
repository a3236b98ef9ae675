//! The print-settings recommender: mesh analysis, requirement profiles and
//! decoding of the classifier's heads into labelled recommendations.

pub mod adapter;
pub mod features;
pub mod mesh;
pub mod profile;
pub mod recommendation;

pub use adapter::{HeadScores, RecommendationAdapter, RecommendationQuery};
pub use features::{BoundingBox, GeometryFeatures, MeshAnalysis};
pub use mesh::ObjMesh;
pub use profile::RequirementProfile;
pub use recommendation::{Head, HeadPrediction, Recommendation};
