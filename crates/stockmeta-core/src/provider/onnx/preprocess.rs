//! Image preprocessing for ONNX classifiers.
//!
//! Produces the usual vision-model input:
//! - Input size: `image_size × image_size` pixels
//! - Normalization: `(pixel/255 - mean) / std` per channel
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Per-channel normalization constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Maps pixels to [-1, 1].
    pub const SYMMETRIC: Self = Self {
        mean: [0.5, 0.5, 0.5],
        std: [0.5, 0.5, 0.5],
    };

    /// ImageNet statistics used by most torchvision exports.
    pub const IMAGENET: Self = Self {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };
}

/// Resize, convert to RGB, normalize, and lay out as a `[1, 3, S, S]` tensor.
pub fn preprocess(image: &DynamicImage, image_size: u32, norm: Normalization) -> Array4<f32> {
    let resized = image.resize_exact(
        image_size,
        image_size,
        image::imageops::FilterType::Triangle,
    );
    let rgb = resized.to_rgb8();

    let size = image_size as usize;
    let plane = size * size;
    let mut flat = vec![0f32; CHANNELS * plane];

    // Work on raw bytes to skip per-pixel bounds checks from get_pixel().
    for (i, pixel) in rgb.as_raw().chunks_exact(CHANNELS).enumerate() {
        for (c, &val) in pixel.iter().enumerate() {
            flat[c * plane + i] = (val as f32 / 255.0 - norm.mean[c]) / norm.std[c];
        }
    }

    Array4::from_shape_vec((1, CHANNELS, size, size), flat)
        .unwrap_or_else(|_| Array4::zeros((1, CHANNELS, size, size)))
}
