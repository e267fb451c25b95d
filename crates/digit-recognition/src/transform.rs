//! Preprocessing that turns an arbitrary raster into the classifier input.
//!
//! The chain is: square center crop, grayscale, resize to 28x28, scale to `[0, 1]`,
//! normalize with the dataset mean and standard deviation, and expand to
//! `[batch=1, channel=1, 28, 28]`.

use std::path::Path;

use burn::{
    config::Config,
    tensor::{backend::Backend, Tensor, TensorData},
};
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};

use crate::{
    error::{Error, InvalidImageError},
    model::INPUT_SIZE,
};

/// Configuration of the normalization applied by [ImageTransform].
#[derive(Config, Debug)]
pub struct TransformConfig {
    /// Mean of the training set, in the `[0, 1]` range.
    #[config(default = 0.1307)]
    pub mean: f64,
    /// Standard deviation of the training set, in the `[0, 1]` range.
    #[config(default = 0.3081)]
    pub std: f64,
}

/// Decode an in-memory image (PNG, JPEG, PNM, ...).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, InvalidImageError> {
    let image = image::load_from_memory(bytes)?;
    log::debug!("Decoded {}x{} image", image.width(), image.height());

    Ok(image)
}

/// Read and decode an image file.
///
/// The format is guessed from the content, not the extension.
pub fn open_image(path: impl AsRef<Path>) -> Result<DynamicImage, InvalidImageError> {
    let bytes = std::fs::read(path)?;

    decode_image(&bytes)
}

/// Crop the largest centered square out of the image.
///
/// The offset along the longer side is `(long - short) / 2` rounded half to even. Square
/// images are returned as is.
pub fn center_crop_square(image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());

    if width == height {
        return image.clone();
    }

    let side = width.min(height);
    let x = center_offset(width, side);
    let y = center_offset(height, side);

    image.crop_imm(x, y, side, side)
}

fn center_offset(length: u32, side: u32) -> u32 {
    (f64::from(length - side) / 2.0).round_ties_even() as u32
}

/// Reduce the image to a single luma channel.
///
/// Color images use the ITU-R 601-2 transform `L = R * 299/1000 + G * 587/1000 + B * 114/1000`
/// in 16 bit fixed point. Gray images keep their samples and any alpha channel is dropped.
pub fn grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => image.to_luma8(),
        _ => {
            let rgb = image.to_rgb8();

            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                Luma([luma(r, g, b)])
            })
        }
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = 19595 * u32::from(r) + 38470 * u32::from(g) + 7471 * u32::from(b);

    ((weighted + 0x8000) >> 16) as u8
}

/// Resize a gray image to `size x size` with a triangle (bilinear) filter.
///
/// An image already at the target size is returned unchanged.
pub fn resize(gray: &GrayImage, size: u32) -> GrayImage {
    if gray.dimensions() == (size, size) {
        return gray.clone();
    }

    image::imageops::resize(gray, size, size, FilterType::Triangle)
}

/// Preprocessing chain producing the `[1, 1, 28, 28]` classifier input.
#[derive(Debug, Clone)]
pub struct ImageTransform {
    mean: f32,
    std: f32,
}

impl Default for ImageTransform {
    fn default() -> Self {
        let config = TransformConfig::new();

        Self {
            mean: config.mean as f32,
            std: config.std as f32,
        }
    }
}

impl ImageTransform {
    /// Create the transform from its configuration.
    ///
    /// The standard deviation must be positive and finite once narrowed to `f32`, and the mean
    /// finite, otherwise every normalized input would be `inf` or `NaN`.
    pub fn new(config: &TransformConfig) -> Result<Self, Error> {
        let (mean, std) = (config.mean as f32, config.std as f32);

        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return Err(Error::Normalization {
                mean: config.mean,
                std: config.std,
            });
        }

        Ok(Self { mean, std })
    }

    /// Apply the whole chain to `image`.
    ///
    /// Fails only when the image has a zero dimension.
    pub fn apply<B: Backend>(
        &self,
        image: &DynamicImage,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, InvalidImageError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(InvalidImageError::Empty { width, height });
        }

        let square = center_crop_square(image);
        let gray = resize(&grayscale(&square), INPUT_SIZE as u32);
        log::debug!(
            "Preprocessed {width}x{height} image into {}x{} gray",
            gray.width(),
            gray.height()
        );

        let pixels = gray
            .into_raw()
            .into_iter()
            .map(f32::from)
            .collect::<Vec<_>>();
        let data = TensorData::new(pixels, [1, 1, INPUT_SIZE, INPUT_SIZE]);

        Ok(self.normalize(Tensor::from_data(data, device)))
    }

    /// Scale raw `[0, 255]` samples to `[0, 1]`, then subtract the mean and divide by the
    /// standard deviation.
    pub fn normalize<B: Backend, const D: usize>(&self, pixels: Tensor<B, D>) -> Tensor<B, D> {
        pixels
            .div_scalar(255.0)
            .sub_scalar(self.mean)
            .div_scalar(self.std)
    }
}
