use super::features::GeometryFeatures;
use super::profile::RequirementProfile;
use super::recommendation::{Head, Recommendation};
use crate::adapters::{CoercionPolicy, TensorAdapter, check_decoded_outputs, coerce_values};
use crate::core::errors::AdvisorError;
use crate::core::tensor::{ElementType, ModelContract, TensorDescriptor, TensorSpec};

/// Name of the recommender's single input.
pub const INPUT_NAME: &str = "input";
/// Length of the recommender's input vector.
pub const FEATURE_LEN: usize = 20;

/// Everything the recommender consumes for one part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationQuery {
    pub features: GeometryFeatures,
    pub profile: RequirementProfile,
}

impl RecommendationQuery {
    pub fn new(features: GeometryFeatures, profile: RequirementProfile) -> Self {
        Self { features, profile }
    }

    /// The 20-value input vector: ten geometric features, linearity rounded
    /// to three decimals, then the ten requirement flags as 0/1.
    pub fn feature_vector(&self) -> [f64; FEATURE_LEN] {
        let mut out = [0.0; FEATURE_LEN];
        let geometry = self.features.to_array();
        out[..10].copy_from_slice(&geometry);
        out[0] = (geometry[0] * 1000.0).round() / 1000.0;
        for (slot, flag) in out[10..].iter_mut().zip(self.profile.flags()) {
            *slot = if flag { 1.0 } else { 0.0 };
        }
        out
    }
}

/// Raw per-head scores, in [`Head::ALL`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadScores(pub [Vec<f32>; 5]);

impl HeadScores {
    /// Picks labels and attaches the profile the query was made with.
    pub fn into_recommendation(
        self,
        profile: RequirementProfile,
    ) -> Result<Recommendation, AdvisorError> {
        Recommendation::from_head_scores(self.0, profile)
    }
}

/// Tensor adapter of the five-head print-settings classifier.
#[derive(Debug, Clone)]
pub struct RecommendationAdapter {
    contract: ModelContract,
    policy: CoercionPolicy,
}

impl RecommendationAdapter {
    /// Adapter whose output names are the [`Head::output_name`]s.
    pub fn new() -> Self {
        Self::with_output_names(Head::ALL.map(Head::output_name))
    }

    /// Adapter for a model exporting the heads under different names,
    /// given in [`Head::ALL`] order.
    pub fn with_output_names(names: [&str; 5]) -> Self {
        let outputs = Head::ALL
            .iter()
            .zip(names)
            .map(|(head, name)| {
                TensorSpec::new(name, ElementType::Float32, vec![1, head.labels().len()])
            })
            .collect();
        Self {
            contract: ModelContract::new(
                vec![TensorSpec::new(INPUT_NAME, ElementType::Float32, vec![1, FEATURE_LEN])],
                outputs,
            ),
            policy: CoercionPolicy::Strict,
        }
    }

    pub fn with_policy(mut self, policy: CoercionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for RecommendationAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorAdapter for RecommendationAdapter {
    type Input = RecommendationQuery;
    type Output = HeadScores;

    fn contract(&self) -> &ModelContract {
        &self.contract
    }

    fn encode(&self, query: &RecommendationQuery) -> Result<Vec<TensorDescriptor>, AdvisorError> {
        let vector = query.feature_vector();
        Ok(vec![coerce_values(&vector, &self.contract.inputs[0], self.policy)?])
    }

    fn decode(&self, outputs: &[TensorDescriptor]) -> Result<HeadScores, AdvisorError> {
        check_decoded_outputs(&self.contract, outputs)?;
        let mut scores: [Vec<f32>; 5] = Default::default();
        for (slot, tensor) in scores.iter_mut().zip(outputs) {
            *slot = tensor.to_vec::<f32>()?;
        }
        Ok(HeadScores(scores))
    }
}
