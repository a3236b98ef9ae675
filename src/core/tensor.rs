//! Backend-agnostic tensor descriptors.
//!
//! A [`TensorDescriptor`] is the unit exchanged with the native runtime: a fixed
//! shape, an element type and a contiguous little-endian byte buffer whose length
//! always equals `product(shape) * element_size`. [`TensorSpec`] and
//! [`ModelContract`] describe what a model declares it consumes and produces.

use crate::core::errors::AdvisorError;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Element types understood by the inference core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float32,
    Float64,
    Int64,
    Int32,
    UInt8,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::Float32 | ElementType::Int32 => 4,
            ElementType::Float64 | ElementType::Int64 => 8,
            ElementType::UInt8 => 1,
        }
    }

    /// Stable tag used when fingerprinting tensor content.
    pub(crate) const fn tag(self) -> u8 {
        match self {
            ElementType::Float32 => 1,
            ElementType::Float64 => 2,
            ElementType::Int64 => 3,
            ElementType::Int32 => 4,
            ElementType::UInt8 => 5,
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
            ElementType::Int64 => "int64",
            ElementType::Int32 => "int32",
            ElementType::UInt8 => "uint8",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust primitive types that map onto an [`ElementType`].
pub trait TensorElement: sealed::Sealed + Copy + Send + Sync + 'static {
    /// The element type this primitive encodes to.
    const ELEMENT_TYPE: ElementType;

    #[doc(hidden)]
    fn write_le(self, out: &mut Vec<u8>);

    #[doc(hidden)]
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_tensor_element {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl TensorElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

impl_tensor_element!(f32, Float32);
impl_tensor_element!(f64, Float64);
impl_tensor_element!(i64, Int64);
impl_tensor_element!(i32, Int32);
impl_tensor_element!(u8, UInt8);

/// Number of elements described by a shape.
///
/// Only meaningful for shapes already accepted by [`byte_len_for`].
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Buffer size in bytes for `shape` of `dtype`, or `None` if it does not fit
/// in an allocation.
pub fn byte_len_for(shape: &[usize], dtype: ElementType) -> Option<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))?
        .checked_mul(dtype.size())
        .filter(|&bytes| bytes <= isize::MAX as usize)
}

/// A shaped, typed, contiguous tensor buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    shape: Vec<usize>,
    dtype: ElementType,
    data: Vec<u8>,
}

impl std::fmt::Debug for TensorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorDescriptor")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl TensorDescriptor {
    /// Creates a descriptor from raw little-endian bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a dimension is zero or the buffer length does not
    /// equal `product(shape) * element_size`.
    pub fn from_bytes(
        shape: Vec<usize>,
        dtype: ElementType,
        data: Vec<u8>,
    ) -> Result<Self, AdvisorError> {
        let expected = Self::check_shape(&shape, dtype)?;
        if data.len() != expected {
            return Err(AdvisorError::invalid_input(format!(
                "buffer of {} bytes does not match shape {:?} of {} ({} bytes expected)",
                data.len(),
                shape,
                dtype,
                expected
            )));
        }
        Ok(Self { shape, dtype, data })
    }

    /// Creates a descriptor from typed values.
    pub fn from_values<T: TensorElement>(
        shape: Vec<usize>,
        values: &[T],
    ) -> Result<Self, AdvisorError> {
        Self::check_shape(&shape, T::ELEMENT_TYPE)?;
        if values.len() != element_count(&shape) {
            return Err(AdvisorError::shape_mismatch(
                T::ELEMENT_TYPE.to_string(),
                &shape,
                &[values.len()],
            ));
        }
        let mut data = Vec::with_capacity(values.len() * T::ELEMENT_TYPE.size());
        for &value in values {
            value.write_le(&mut data);
        }
        Ok(Self {
            shape,
            dtype: T::ELEMENT_TYPE,
            data,
        })
    }

    /// Creates a zero-filled descriptor.
    pub fn zeros(shape: Vec<usize>, dtype: ElementType) -> Result<Self, AdvisorError> {
        let len = Self::check_shape(&shape, dtype)?;
        Ok(Self {
            shape,
            dtype,
            data: vec![0; len],
        })
    }

    /// Checks the shape and returns the buffer size it requires.
    fn check_shape(shape: &[usize], dtype: ElementType) -> Result<usize, AdvisorError> {
        if shape.is_empty() {
            return Err(AdvisorError::invalid_input("tensor shape must have at least one dimension"));
        }
        if let Some(axis) = shape.iter().position(|&d| d == 0) {
            return Err(AdvisorError::invalid_input(format!(
                "tensor dimension {axis} of shape {shape:?} must be positive"
            )));
        }
        byte_len_for(shape, dtype).ok_or_else(|| {
            AdvisorError::invalid_input(format!(
                "tensor shape {shape:?} of {dtype} is too large to allocate"
            ))
        })
    }

    /// Returns the shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element type.
    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    /// Returns the raw little-endian bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        element_count(&self.shape)
    }

    /// Returns true if the tensor has no elements (never true for a valid descriptor).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of bytes held by the buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Decodes the buffer into typed values.
    ///
    /// # Errors
    ///
    /// Returns `TypeConversion` if `T` does not match the descriptor's element type;
    /// no implicit numeric conversion is performed.
    pub fn to_vec<T: TensorElement>(&self) -> Result<Vec<T>, AdvisorError> {
        if T::ELEMENT_TYPE != self.dtype {
            return Err(AdvisorError::type_conversion(
                "tensor",
                T::ELEMENT_TYPE,
                0,
                format!("descriptor holds {} elements", self.dtype),
            ));
        }
        Ok(self
            .data
            .chunks_exact(self.dtype.size())
            .map(T::read_le)
            .collect())
    }

    /// Decodes a float32 descriptor into a dynamic-rank array.
    pub fn to_array_f32(&self) -> Result<ArrayD<f32>, AdvisorError> {
        let values = self.to_vec::<f32>()?;
        Ok(ArrayD::from_shape_vec(self.shape.clone(), values)?)
    }

    /// Returns a copy with a different shape of equal element count.
    pub fn reshaped(&self, shape: Vec<usize>) -> Result<Self, AdvisorError> {
        Self::check_shape(&shape, self.dtype)?;
        if element_count(&shape) != self.len() {
            return Err(AdvisorError::shape_mismatch("tensor", &shape, &self.shape));
        }
        Ok(Self {
            shape,
            dtype: self.dtype,
            data: self.data.clone(),
        })
    }

    /// Short textual description used in error messages.
    pub fn describe(&self) -> String {
        format!("{} {:?}", self.dtype, self.shape)
    }
}

/// Declared name, element type and fixed shape of a model input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    /// Tensor name as known to the runtime.
    pub name: String,
    /// Element type.
    pub dtype: ElementType,
    /// Fixed shape; every dimension is positive.
    pub shape: Vec<usize>,
}

impl TensorSpec {
    /// Creates a new tensor spec.
    pub fn new(name: impl Into<String>, dtype: ElementType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
        }
    }

    /// Number of elements described by this spec.
    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }

    /// Short textual description used in error messages.
    pub fn describe(&self) -> String {
        format!("{} {:?}", self.dtype, self.shape)
    }

    /// Checks that an input descriptor fits this spec exactly.
    pub fn check_input(&self, tensor: &TensorDescriptor) -> Result<(), AdvisorError> {
        if tensor.dtype() != self.dtype {
            return Err(AdvisorError::type_conversion(
                &self.name,
                self.dtype,
                0,
                format!("input holds {} elements; coercion must happen before submission", tensor.dtype()),
            ));
        }
        if tensor.shape() != self.shape.as_slice() {
            return Err(AdvisorError::shape_mismatch(&self.name, &self.shape, tensor.shape()));
        }
        Ok(())
    }

    /// Checks that an output descriptor is consistent with this spec.
    pub fn check_output(&self, tensor: &TensorDescriptor) -> Result<(), AdvisorError> {
        if tensor.dtype() != self.dtype || tensor.shape() != self.shape.as_slice() {
            return Err(AdvisorError::unexpected_shape(
                &self.name,
                self.describe(),
                tensor.describe(),
            ));
        }
        Ok(())
    }
}

/// Input and output contract of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelContract {
    /// Declared inputs, in the order the runtime expects them.
    pub inputs: Vec<TensorSpec>,
    /// Declared outputs, in the order results are returned.
    pub outputs: Vec<TensorSpec>,
}

impl ModelContract {
    /// Creates a contract from input and output specs.
    pub fn new(inputs: Vec<TensorSpec>, outputs: Vec<TensorSpec>) -> Self {
        Self { inputs, outputs }
    }

    /// Validates a full input set against the declared inputs.
    pub fn check_inputs(&self, inputs: &[TensorDescriptor]) -> Result<(), AdvisorError> {
        if inputs.len() != self.inputs.len() {
            return Err(AdvisorError::invalid_input(format!(
                "model expects {} input tensor(s), got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }
        self.inputs
            .iter()
            .zip(inputs)
            .try_for_each(|(spec, tensor)| spec.check_input(tensor))
    }

    /// Validates a full output set against the declared outputs.
    pub fn check_outputs(&self, outputs: &[TensorDescriptor]) -> Result<(), AdvisorError> {
        if outputs.len() != self.outputs.len() {
            return Err(AdvisorError::unexpected_shape(
                "outputs",
                format!("{} tensor(s)", self.outputs.len()),
                format!("{} tensor(s)", outputs.len()),
            ));
        }
        self.outputs
            .iter()
            .zip(outputs)
            .try_for_each(|(spec, tensor)| spec.check_output(tensor))
    }

    /// Builds a zero-filled input set matching the declared inputs.
    pub fn zero_inputs(&self) -> Result<Vec<TensorDescriptor>, AdvisorError> {
        self.inputs
            .iter()
            .map(|spec| TensorDescriptor::zeros(spec.shape.clone(), spec.dtype))
            .collect()
    }
}
