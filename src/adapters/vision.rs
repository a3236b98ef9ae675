//! Image inputs.

use super::{TensorAdapter, check_decoded_outputs, values_as_f32};
use crate::core::errors::AdvisorError;
use crate::core::tensor::{ElementType, ModelContract, TensorDescriptor};
use crate::core::validation::{validate_image_dimensions, validate_normalization_params, validate_positive};
use image::DynamicImage;
use image::imageops::FilterType;
use rayon::prelude::*;

/// Per-channel affine normalization: `value * alpha + beta`.
///
/// `alpha = scale / std` and `beta = -mean / std`, so the result equals
/// `(value * scale - mean) / std`.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl ImageNormalizer {
    /// Creates a normalizer.
    ///
    /// # Arguments
    ///
    /// * `scale` - Factor applied to raw 8-bit values (defaults to 1/255)
    /// * `mean` - Per-channel mean (defaults to the ImageNet mean)
    /// * `std` - Per-channel standard deviation (defaults to the ImageNet std)
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the scale is not positive, a std value is not
    /// positive, or a parameter is not finite.
    pub fn new(
        scale: Option<f32>,
        mean: Option<[f32; 3]>,
        std: Option<[f32; 3]>,
    ) -> Result<Self, AdvisorError> {
        let scale = scale.unwrap_or(1.0 / 255.0);
        let mean = mean.unwrap_or([0.485, 0.456, 0.406]);
        let std = std.unwrap_or([0.229, 0.224, 0.225]);

        validate_positive(scale, "scale")?;
        validate_normalization_params(&mean, &std, 3)?;
        Ok(Self::from_params(scale, mean, std))
    }

    fn from_params(scale: f32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            alpha: std.map(|s| scale / s),
            beta: [0, 1, 2].map(|c| -mean[c] / std[c]),
        }
    }

    /// Normalizes an RGB image into a CHW buffer.
    pub fn normalize_chw(&self, img: &DynamicImage) -> Vec<f32> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let plane = (width * height) as usize;
        let mut out = vec![0.0f32; plane * 3];

        for (index, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                out[c * plane + index] = f32::from(pixel[c]) * self.alpha[c] + self.beta[c];
            }
        }
        out
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::from_params(1.0 / 255.0, [0.485, 0.456, 0.406], [0.229, 0.224, 0.225])
    }
}

/// Encodes an image into a `[1, 3, H, W]` float32 input and decodes the first
/// output into a flat score vector.
#[derive(Debug, Clone)]
pub struct ImageTensorAdapter {
    contract: ModelContract,
    normalizer: ImageNormalizer,
    width: u32,
    height: u32,
    filter: FilterType,
}

impl ImageTensorAdapter {
    /// Creates an adapter for a contract whose only input is `[1, 3, H, W]` float32.
    pub fn new(contract: ModelContract, normalizer: ImageNormalizer) -> Result<Self, AdvisorError> {
        let [input] = contract.inputs.as_slice() else {
            return Err(AdvisorError::invalid_input(format!(
                "image adapter needs exactly one model input, contract declares {}",
                contract.inputs.len()
            )));
        };
        let (height, width) = match input.shape.as_slice() {
            &[1, 3, h, w] if input.dtype == ElementType::Float32 => (h, w),
            _ => {
                return Err(AdvisorError::invalid_input(format!(
                    "image adapter needs a float32 [1, 3, H, W] input, '{}' is {}",
                    input.name,
                    input.describe()
                )));
            }
        };
        let height = u32::try_from(height)
            .map_err(|_| AdvisorError::invalid_input("image height does not fit in u32"))?;
        let width = u32::try_from(width)
            .map_err(|_| AdvisorError::invalid_input("image width does not fit in u32"))?;
        validate_image_dimensions(height, width, "image adapter input")?;
        if contract.outputs.is_empty() {
            return Err(AdvisorError::invalid_input("image adapter needs at least one model output"));
        }

        Ok(Self {
            contract,
            normalizer,
            width,
            height,
            filter: FilterType::Triangle,
        })
    }

    /// Sets the resampling filter used when resizing to the input size.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Target input size as `(width, height)`.
    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Encodes several images, normalizing them in parallel.
    pub fn encode_batch(
        &self,
        images: &[DynamicImage],
    ) -> Result<Vec<Vec<TensorDescriptor>>, AdvisorError> {
        images.par_iter().map(|img| self.encode(img)).collect()
    }
}

impl TensorAdapter for ImageTensorAdapter {
    type Input = DynamicImage;
    type Output = Vec<f32>;

    fn contract(&self) -> &ModelContract {
        &self.contract
    }

    fn encode(&self, img: &DynamicImage) -> Result<Vec<TensorDescriptor>, AdvisorError> {
        validate_image_dimensions(img.height(), img.width(), "image adapter encode")?;
        let values = if img.width() == self.width && img.height() == self.height {
            self.normalizer.normalize_chw(img)
        } else {
            let resized = img.resize_exact(self.width, self.height, self.filter);
            self.normalizer.normalize_chw(&resized)
        };
        let spec = &self.contract.inputs[0];
        Ok(vec![TensorDescriptor::from_values(spec.shape.clone(), &values)?])
    }

    fn decode(&self, outputs: &[TensorDescriptor]) -> Result<Vec<f32>, AdvisorError> {
        check_decoded_outputs(&self.contract, outputs)?;
        values_as_f32(&outputs[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::core::tensor::TensorSpec;
    use image::{Rgb, RgbImage};

    fn contract(h: usize, w: usize) -> ModelContract {
        ModelContract::new(
            vec![TensorSpec::new("image", ElementType::Float32, vec![1, 3, h, w])],
            vec![TensorSpec::new("scores", ElementType::Float32, vec![1, 3])],
        )
    }

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn test_normalizer_parameters() {
        let norm = ImageNormalizer::new(Some(1.0), Some([1.0, 2.0, 3.0]), Some([2.0, 2.0, 2.0])).unwrap();
        let values = norm.normalize_chw(&solid(1, 1, [5, 6, 7]));
        assert_eq!(values, vec![2.0, 2.0, 2.0]);

        assert!(ImageNormalizer::new(Some(0.0), None, None).is_err());
        assert!(ImageNormalizer::new(None, None, Some([1.0, 0.0, 1.0])).is_err());
    }

    #[test]
    fn test_default_matches_imagenet_constructor() {
        let built = ImageNormalizer::new(None, None, None).unwrap();
        let default = ImageNormalizer::default();
        let img = solid(2, 2, [10, 128, 250]);
        assert_eq!(built.normalize_chw(&img), default.normalize_chw(&img));
    }

    #[test]
    fn test_encode_resizes_to_declared_shape() {
        let adapter = ImageTensorAdapter::new(contract(4, 6), ImageNormalizer::default())
            .unwrap()
            .with_filter(FilterType::Nearest);
        assert_eq!(adapter.input_size(), (6, 4));

        let encoded = adapter.encode(&solid(13, 9, [255, 0, 0])).unwrap();
        assert_eq!(encoded[0].shape(), &[1, 3, 4, 6]);
        let values = encoded[0].to_vec::<f32>().unwrap();
        let red = (1.0 - 0.485) / 0.229;
        assert!((values[0] - red).abs() < 1e-4);
    }

    #[test]
    fn test_encode_batch_in_parallel() {
        let adapter = ImageTensorAdapter::new(contract(2, 2), ImageNormalizer::default()).unwrap();
        let images: Vec<_> = (0..8u8).map(|i| solid(3, 3, [i * 10, 0, 0])).collect();
        let batch = adapter.encode_batch(&images).unwrap();
        assert_eq!(batch.len(), 8);
        assert_eq!(batch[3], adapter.encode(&images[3]).unwrap());
    }

    #[test]
    fn test_rejects_non_image_contract() {
        let contract = ModelContract::new(
            vec![TensorSpec::new("x", ElementType::Float32, vec![1, 20])],
            vec![TensorSpec::new("y", ElementType::Float32, vec![1, 1])],
        );
        let err = ImageTensorAdapter::new(contract, ImageNormalizer::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_decode_first_output() {
        let adapter = ImageTensorAdapter::new(contract(2, 2), ImageNormalizer::default()).unwrap();
        let scores = TensorDescriptor::from_values(vec![1, 3], &[0.1f32, 0.7, 0.2]).unwrap();
        assert_eq!(adapter.decode(&[scores]).unwrap(), vec![0.1, 0.7, 0.2]);
    }
}
