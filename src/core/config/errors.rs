//! Configuration error types and validation traits.

use crate::core::errors::AdvisorError;
use crate::core::tensor::{TensorSpec, byte_len_for};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A model path does not exist.
    #[error("model path does not exist: {path}")]
    ModelPathNotFound { path: std::path::PathBuf },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A model contract is malformed.
    #[error("invalid model contract: {message}")]
    InvalidContract { message: String },

    /// A resource limit has been exceeded.
    #[error("resource limit exceeded: {message}")]
    ResourceLimitExceeded { message: String },
}

/// A trait for validating configuration parameters.
pub trait ConfigValidator {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Validates a model path.
    ///
    /// This method checks that the model path exists and is a file.
    fn validate_model_path(&self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            Err(ConfigError::ModelPathNotFound {
                path: path.to_path_buf(),
            })
        } else if !path.is_file() {
            Err(ConfigError::InvalidConfig {
                message: format!("Model path is not a file: {}", path.display()),
            })
        } else {
            Ok(())
        }
    }

    /// Validates thread count.
    fn validate_thread_count(&self, thread_count: usize) -> Result<(), ConfigError> {
        const MAX_REASONABLE_THREADS: usize = 256;

        if thread_count == 0 {
            Err(ConfigError::InvalidConfig {
                message: "Thread count must be greater than 0".to_string(),
            })
        } else if thread_count > MAX_REASONABLE_THREADS {
            Err(ConfigError::ResourceLimitExceeded {
                message: format!(
                    "Thread count {} exceeds reasonable maximum of {}",
                    thread_count, MAX_REASONABLE_THREADS
                ),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a usize value is positive.
    fn validate_positive_usize(&self, value: usize, field_name: &str) -> Result<(), ConfigError> {
        if value == 0 {
            Err(ConfigError::InvalidConfig {
                message: format!("{} must be greater than 0, got {}", field_name, value),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a set of tensor specs: unique non-empty names and positive dimensions.
    fn validate_tensor_specs(&self, specs: &[TensorSpec], role: &str) -> Result<(), ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::InvalidContract {
                message: format!("at least one {role} tensor must be declared"),
            });
        }
        for (i, spec) in specs.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::InvalidContract {
                    message: format!("{role} tensor {i} has an empty name"),
                });
            }
            if specs[..i].iter().any(|other| other.name == spec.name) {
                return Err(ConfigError::InvalidContract {
                    message: format!("duplicate {role} tensor name '{}'", spec.name),
                });
            }
            if spec.shape.is_empty() || spec.shape.contains(&0) {
                return Err(ConfigError::InvalidContract {
                    message: format!(
                        "{role} tensor '{}' must have a fixed positive shape, got {:?}",
                        spec.name, spec.shape
                    ),
                });
            }
            if byte_len_for(&spec.shape, spec.dtype).is_none() {
                return Err(ConfigError::InvalidContract {
                    message: format!(
                        "{role} tensor '{}' shape {:?} is too large to allocate",
                        spec.name, spec.shape
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Extension trait for ConfigValidator that provides error wrapping utilities.
pub trait ConfigValidatorExt: ConfigValidator {
    /// Validates configuration and converts failures into [`AdvisorError`].
    fn validated(self) -> Result<Self, AdvisorError>
    where
        Self: Sized,
    {
        self.validate()?;
        Ok(self)
    }
}

impl<T: ConfigValidator> ConfigValidatorExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::ElementType;

    struct TestValidator;
    impl ConfigValidator for TestValidator {
        fn validate(&self) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    #[test]
    fn test_validate_thread_count() {
        let validator = TestValidator;
        assert!(validator.validate_thread_count(1).is_ok());
        assert!(validator.validate_thread_count(64).is_ok());
        assert!(validator.validate_thread_count(0).is_err());
        assert!(validator.validate_thread_count(512).is_err());
    }

    #[test]
    fn test_validate_model_path() {
        let validator = TestValidator;
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(validator.validate_model_path(file.path()).is_ok());

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validator.validate_model_path(dir.path()),
            Err(ConfigError::InvalidConfig { .. })
        ));
        assert!(matches!(
            validator.validate_model_path(&dir.path().join("missing.onnx")),
            Err(ConfigError::ModelPathNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_tensor_specs() {
        let validator = TestValidator;
        let good = vec![
            TensorSpec::new("input", ElementType::Float32, vec![1, 20]),
            TensorSpec::new("mask", ElementType::UInt8, vec![1, 20]),
        ];
        assert!(validator.validate_tensor_specs(&good, "input").is_ok());

        let duplicate = vec![good[0].clone(), good[0].clone()];
        assert!(validator.validate_tensor_specs(&duplicate, "input").is_err());

        let zero_dim = vec![TensorSpec::new("input", ElementType::Float32, vec![1, 0])];
        assert!(validator.validate_tensor_specs(&zero_dim, "input").is_err());

        let oversized = vec![TensorSpec::new("input", ElementType::Float32, vec![1 << 62, 4])];
        assert!(matches!(
            validator.validate_tensor_specs(&oversized, "input"),
            Err(ConfigError::InvalidContract { .. })
        ));

        assert!(validator.validate_tensor_specs(&[], "output").is_err());
    }
}
