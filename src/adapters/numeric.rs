use super::{CoercionPolicy, TensorAdapter, check_decoded_outputs, coerce_values, values_as_f32};
use crate::core::errors::AdvisorError;
use crate::core::tensor::{ModelContract, TensorDescriptor};
use ndarray::ArrayD;

/// Encodes a flat numeric feature vector into the single declared input.
///
/// Outputs decode to one `f32` array per declared output, in contract order.
#[derive(Debug, Clone)]
pub struct FeatureVectorAdapter {
    contract: ModelContract,
    policy: CoercionPolicy,
}

impl FeatureVectorAdapter {
    /// Creates an adapter for a contract with exactly one input.
    pub fn new(contract: ModelContract) -> Result<Self, AdvisorError> {
        if contract.inputs.len() != 1 {
            return Err(AdvisorError::invalid_input(format!(
                "feature vector adapter needs exactly one model input, contract declares {}",
                contract.inputs.len()
            )));
        }
        Ok(Self {
            contract,
            policy: CoercionPolicy::default(),
        })
    }

    /// Sets the coercion policy.
    pub fn with_policy(mut self, policy: CoercionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CoercionPolicy {
        self.policy
    }
}

impl TensorAdapter for FeatureVectorAdapter {
    type Input = [f64];
    type Output = Vec<ArrayD<f32>>;

    fn contract(&self) -> &ModelContract {
        &self.contract
    }

    fn encode(&self, input: &[f64]) -> Result<Vec<TensorDescriptor>, AdvisorError> {
        let spec = &self.contract.inputs[0];
        Ok(vec![coerce_values(input, spec, self.policy)?])
    }

    fn decode(&self, outputs: &[TensorDescriptor]) -> Result<Self::Output, AdvisorError> {
        check_decoded_outputs(&self.contract, outputs)?;
        outputs
            .iter()
            .map(|tensor| {
                let values = values_as_f32(tensor)?;
                Ok::<_, AdvisorError>(ArrayD::from_shape_vec(tensor.shape().to_vec(), values)?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::core::tensor::{ElementType, TensorSpec};

    fn contract(input: ElementType) -> ModelContract {
        ModelContract::new(
            vec![TensorSpec::new("features", input, vec![1, 3])],
            vec![TensorSpec::new("scores", ElementType::Float32, vec![1, 2])],
        )
    }

    #[test]
    fn test_encode_uses_declared_spec() {
        let adapter = FeatureVectorAdapter::new(contract(ElementType::Int64)).unwrap();
        let encoded = adapter.encode(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].shape(), &[1, 3]);
        assert_eq!(encoded[0].to_vec::<i64>().unwrap(), vec![1, 2, 3]);

        let err = adapter.encode(&[1.0, 2.5, 3.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeConversion);
        let err = adapter.encode(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);

        let saturating = adapter.with_policy(CoercionPolicy::Saturating);
        let encoded = saturating.encode(&[1.0, 2.5, 3.0]).unwrap();
        assert_eq!(encoded[0].to_vec::<i64>().unwrap(), vec![1, 3, 3]);
    }

    #[test]
    fn test_decode_checks_output_contract() {
        let adapter = FeatureVectorAdapter::new(contract(ElementType::Float32)).unwrap();
        let scores = TensorDescriptor::from_values(vec![1, 2], &[0.25f32, 0.75]).unwrap();
        let decoded = adapter.decode(&[scores]).unwrap();
        assert_eq!(decoded[0].shape(), &[1, 2]);
        assert_eq!(decoded[0].iter().copied().collect::<Vec<f32>>(), vec![0.25, 0.75]);

        let wrong = TensorDescriptor::from_values(vec![2], &[0.25f32, 0.75]).unwrap();
        assert_eq!(
            adapter.decode(&[wrong]).unwrap_err().kind(),
            ErrorKind::UnexpectedShape
        );
        assert_eq!(
            adapter.decode(&[]).unwrap_err().kind(),
            ErrorKind::UnexpectedShape
        );
    }

    #[test]
    fn test_round_trip_through_session() {
        use crate::core::config::SessionConfig;
        use crate::core::inference::ModelSession;
        use crate::test_support::{ScriptedRuntime, echo_contract};
        use std::sync::Arc;

        let runtime = ScriptedRuntime::new();
        let session = ModelSession::new(
            Arc::new(runtime),
            SessionConfig::new(echo_contract()).warmup(false),
        )
        .unwrap();
        session.load(&ScriptedRuntime::valid_source()).unwrap();

        let adapter = FeatureVectorAdapter::new(echo_contract()).unwrap();
        let values = [0.5, -1.25, 2.0, 1024.0];
        let outputs = session.run(&adapter.encode(&values).unwrap()).unwrap();
        let decoded = adapter.decode(&outputs).unwrap();
        let expected: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        assert_eq!(decoded[0].iter().copied().collect::<Vec<f32>>(), expected);
    }

    #[test]
    fn test_requires_single_input() {
        let contract = ModelContract::new(vec![], vec![]);
        assert!(FeatureVectorAdapter::new(contract).is_err());
    }
}
