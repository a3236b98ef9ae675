//! Input validation helpers shared by the adapters and the mesh analysis.

use crate::core::errors::AdvisorError;

/// Validates that a float value is finite (not NaN or infinite).
#[inline]
pub fn validate_finite(value: f32, param_name: &str) -> Result<(), AdvisorError> {
    if !value.is_finite() {
        return Err(AdvisorError::invalid_input(format!(
            "Parameter '{}' must be finite, got: {}",
            param_name, value
        )));
    }
    Ok(())
}

/// Validates that a value is positive (> 0).
#[inline]
pub fn validate_positive<T: PartialOrd + std::fmt::Display + Default>(
    value: T,
    param_name: &str,
) -> Result<(), AdvisorError> {
    if value <= T::default() {
        return Err(AdvisorError::invalid_input(format!(
            "Parameter '{}' must be positive, got: {}",
            param_name, value
        )));
    }
    Ok(())
}

/// Validates normalization parameters (mean and std) for `num_channels` channels.
pub fn validate_normalization_params(
    mean: &[f32],
    std: &[f32],
    num_channels: usize,
) -> Result<(), AdvisorError> {
    if mean.len() != num_channels || std.len() != num_channels {
        return Err(AdvisorError::invalid_input(format!(
            "mean/std lengths ({}, {}) do not match number of channels {}",
            mean.len(),
            std.len(),
            num_channels
        )));
    }

    for (i, &m) in mean.iter().enumerate() {
        validate_finite(m, &format!("mean[{}]", i))?;
    }
    for (i, &s) in std.iter().enumerate() {
        validate_finite(s, &format!("std[{}]", i))?;
        validate_positive(s, &format!("std[{}]", i))?;
    }

    Ok(())
}

/// Validates image dimensions: both positive and below 32768.
pub fn validate_image_dimensions(height: u32, width: u32, context: &str) -> Result<(), AdvisorError> {
    const MAX_DIMENSION: u32 = 32768;

    if height == 0 || width == 0 {
        return Err(AdvisorError::invalid_input(format!(
            "{}: image dimensions must be positive, got {}x{}",
            context, height, width
        )));
    }
    if height > MAX_DIMENSION || width > MAX_DIMENSION {
        return Err(AdvisorError::invalid_input(format!(
            "{}: image dimensions {}x{} exceed maximum {}x{}",
            context, height, width, MAX_DIMENSION, MAX_DIMENSION
        )));
    }
    Ok(())
}
