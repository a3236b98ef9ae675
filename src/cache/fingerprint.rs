//! Content fingerprints of request inputs.

use crate::core::inference::ModelVersion;
use crate::core::tensor::TensorDescriptor;
use xxhash_rust::xxh3::Xxh3;

/// 128-bit XXH3 digest over the element type, shape and bytes of every input.
///
/// Two input sets with the same digest are treated as identical. Tensors are
/// framed by their rank and byte length so adjacent tensors cannot alias.
pub fn fingerprint(inputs: &[TensorDescriptor]) -> u128 {
    let mut hasher = Xxh3::new();
    hasher.update(&(inputs.len() as u64).to_le_bytes());
    for tensor in inputs {
        hasher.update(&[tensor.dtype().tag()]);
        hasher.update(&(tensor.shape().len() as u64).to_le_bytes());
        for &dim in tensor.shape() {
            hasher.update(&(dim as u64).to_le_bytes());
        }
        hasher.update(&(tensor.byte_len() as u64).to_le_bytes());
        hasher.update(tensor.as_bytes());
    }
    hasher.digest128()
}

/// Key of a cached result: the model version that produced it and the input digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub version: ModelVersion,
    pub digest: u128,
}

impl CacheKey {
    pub fn new(version: ModelVersion, inputs: &[TensorDescriptor]) -> Self {
        Self {
            version,
            digest: fingerprint(inputs),
        }
    }
}
