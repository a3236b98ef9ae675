//! Conversion between domain values and tensor descriptors.
//!
//! An adapter knows the [`ModelContract`] it targets. `encode` produces the
//! input set in contract order; `decode` validates the raw outputs against the
//! contract before interpreting them. Adapters are pure.

mod vision;
mod numeric;

pub use vision::{ImageNormalizer, ImageTensorAdapter};
pub use numeric::FeatureVectorAdapter;

use crate::core::errors::AdvisorError;
use crate::core::tensor::{ElementType, ModelContract, TensorDescriptor, TensorSpec};
use serde::{Deserialize, Serialize};

/// Converts a domain input into model inputs and raw outputs into a domain result.
pub trait TensorAdapter: Send + Sync {
    /// Domain input.
    type Input: ?Sized;
    /// Domain result.
    type Output;

    /// The contract encoded inputs and decoded outputs conform to.
    fn contract(&self) -> &ModelContract;

    /// Encodes `input` into one descriptor per declared input.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the input cannot be laid out in the declared shape,
    /// `TypeConversion` if a value cannot be represented under the coercion policy.
    fn encode(&self, input: &Self::Input) -> Result<Vec<TensorDescriptor>, AdvisorError>;

    /// Decodes raw outputs.
    ///
    /// # Errors
    ///
    /// `UnexpectedShape` if an output is missing or its shape or element type
    /// differs from the declared output.
    fn decode(&self, outputs: &[TensorDescriptor]) -> Result<Self::Output, AdvisorError>;
}

/// How numeric values are coerced into a narrower or integral element type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionPolicy {
    /// Reject any value the target cannot hold exactly (float narrowing may
    /// round within the target's relative epsilon).
    #[default]
    Strict,
    /// Round fractional values, clamp out-of-range values to the target bounds
    /// and map NaN to zero.
    Saturating,
}

/// Lays `values` out as a tensor matching `spec`, coercing each element.
pub fn coerce_values(
    values: &[f64],
    spec: &TensorSpec,
    policy: CoercionPolicy,
) -> Result<TensorDescriptor, AdvisorError> {
    if values.len() != spec.element_count() {
        return Err(AdvisorError::shape_mismatch(
            &spec.name,
            &spec.shape,
            &[values.len()],
        ));
    }
    let shape = spec.shape.clone();
    match spec.dtype {
        ElementType::Float32 => {
            let coerced = coerce_all(values, spec, policy, to_f32)?;
            TensorDescriptor::from_values(shape, &coerced)
        }
        ElementType::Float64 => {
            let coerced = coerce_all(values, spec, policy, to_f64)?;
            TensorDescriptor::from_values(shape, &coerced)
        }
        ElementType::Int64 => {
            let coerced = coerce_all(values, spec, policy, to_i64)?;
            TensorDescriptor::from_values(shape, &coerced)
        }
        ElementType::Int32 => {
            let coerced = coerce_all(values, spec, policy, to_i32)?;
            TensorDescriptor::from_values(shape, &coerced)
        }
        ElementType::UInt8 => {
            let coerced = coerce_all(values, spec, policy, to_u8)?;
            TensorDescriptor::from_values(shape, &coerced)
        }
    }
}

type Coercer<T> = fn(f64, CoercionPolicy) -> Result<T, &'static str>;

fn coerce_all<T>(
    values: &[f64],
    spec: &TensorSpec,
    policy: CoercionPolicy,
    coerce: Coercer<T>,
) -> Result<Vec<T>, AdvisorError> {
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            coerce(value, policy)
                .map_err(|reason| AdvisorError::type_conversion(&spec.name, spec.dtype, index, reason))
        })
        .collect()
}

fn to_f64(value: f64, policy: CoercionPolicy) -> Result<f64, &'static str> {
    match policy {
        CoercionPolicy::Strict if !value.is_finite() => Err("value is not finite"),
        CoercionPolicy::Saturating if value.is_nan() => Ok(0.0),
        _ => Ok(value),
    }
}

fn to_f32(value: f64, policy: CoercionPolicy) -> Result<f32, &'static str> {
    let value = to_f64(value, policy)?;
    let max = f64::from(f32::MAX);
    if value.abs() > max {
        return match policy {
            CoercionPolicy::Strict => Err("value is outside the float32 range"),
            CoercionPolicy::Saturating => Ok(value.clamp(-max, max) as f32),
        };
    }
    let narrowed = value as f32;
    if policy == CoercionPolicy::Strict
        && (f64::from(narrowed) - value).abs() > f64::from(f32::EPSILON) * value.abs()
    {
        return Err("narrowing to float32 changes the value");
    }
    Ok(narrowed)
}

/// Validates or saturates `value` against an integral range `[min, max]`.
fn to_integral(value: f64, min: f64, max: f64, policy: CoercionPolicy) -> Result<f64, &'static str> {
    match policy {
        CoercionPolicy::Strict => {
            if !value.is_finite() {
                Err("value is not finite")
            } else if value.fract() != 0.0 {
                Err("value has a fractional part")
            } else if value < min || value > max {
                Err("value is outside the target range")
            } else {
                Ok(value)
            }
        }
        CoercionPolicy::Saturating if value.is_nan() => Ok(0.0),
        CoercionPolicy::Saturating => Ok(value.round().clamp(min, max)),
    }
}

fn to_i64(value: f64, policy: CoercionPolicy) -> Result<i64, &'static str> {
    // i64::MAX is not representable as f64; 2^63 is the first value out of range.
    const UPPER: f64 = 9_223_372_036_854_775_808.0;
    if policy == CoercionPolicy::Strict && value >= UPPER {
        return Err("value is outside the target range");
    }
    to_integral(value, i64::MIN as f64, UPPER, policy).map(|v| v as i64)
}

fn to_i32(value: f64, policy: CoercionPolicy) -> Result<i32, &'static str> {
    to_integral(value, f64::from(i32::MIN), f64::from(i32::MAX), policy).map(|v| v as i32)
}

fn to_u8(value: f64, policy: CoercionPolicy) -> Result<u8, &'static str> {
    to_integral(value, 0.0, f64::from(u8::MAX), policy).map(|v| v as u8)
}

/// Reads any numeric descriptor as float32 values.
pub(crate) fn values_as_f32(tensor: &TensorDescriptor) -> Result<Vec<f32>, AdvisorError> {
    Ok(match tensor.dtype() {
        ElementType::Float32 => tensor.to_vec::<f32>()?,
        ElementType::Float64 => tensor.to_vec::<f64>()?.into_iter().map(|v| v as f32).collect(),
        ElementType::Int64 => tensor.to_vec::<i64>()?.into_iter().map(|v| v as f32).collect(),
        ElementType::Int32 => tensor.to_vec::<i32>()?.into_iter().map(|v| v as f32).collect(),
        ElementType::UInt8 => tensor.to_vec::<u8>()?.into_iter().map(f32::from).collect(),
    })
}

/// Checks raw outputs against the contract, naming a missing output explicitly.
pub(crate) fn check_decoded_outputs(
    contract: &ModelContract,
    outputs: &[TensorDescriptor],
) -> Result<(), AdvisorError> {
    if let Some(missing) = contract.outputs.get(outputs.len()) {
        return Err(AdvisorError::unexpected_shape(
            &missing.name,
            missing.describe(),
            "missing output",
        ));
    }
    contract.check_outputs(outputs)
}
