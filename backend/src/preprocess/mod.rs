pub mod autocrop;
pub mod enhance;

use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::Array4;
use serde::Deserialize;

use crate::storage::{ImageStore, StorageError, StoredImage};

/// Side length of the square input the classifier was trained on.
pub const INPUT_SIZE: u32 = 160;

/// NHWC batch of one, values in [0, 1].
pub type InputTensor = Array4<f32>;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Could not decode image: {0}")]
    InvalidImage(#[from] image::ImageError),
    #[error("Could not store processed image: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PreprocessOptions {
    #[serde(default)]
    pub enhance_contrast: bool,
    #[serde(default)]
    pub auto_crop: bool,
}

pub struct PreparedImage {
    pub tensor: InputTensor,
    pub processed: StoredImage,
}

/// Turns raw upload bytes into classifier input, keeping a displayable copy
/// of the image as it looked just before resizing.
#[derive(Clone)]
pub struct ImagePreprocessor {
    processed: ImageStore,
    input_size: u32,
}

impl ImagePreprocessor {
    pub fn new(processed: ImageStore) -> Self {
        Self {
            processed,
            input_size: INPUT_SIZE,
        }
    }

    pub fn decode(image_bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
        Ok(image::load_from_memory(image_bytes)?.to_rgb8())
    }

    pub fn prepare(
        &self,
        image_bytes: &[u8],
        options: PreprocessOptions,
    ) -> Result<PreparedImage, PreprocessError> {
        let mut image = Self::decode(image_bytes)?;

        if options.enhance_contrast {
            image = enhance::enhance(&image);
        }
        if options.auto_crop {
            image = autocrop::auto_crop(&image);
        }

        let processed = self
            .processed
            .save_jpeg(&ImageStore::processed_name(), &DynamicImage::ImageRgb8(image.clone()))?;

        let tensor = self.to_tensor(&image);
        Ok(PreparedImage { tensor, processed })
    }

    /// Removes a processed copy that will not be returned to the caller.
    pub fn discard(&self, processed: &StoredImage) {
        self.processed.discard(processed);
    }

    /// Resizes to the classifier resolution and scales channels to [0, 1].
    pub fn to_tensor(&self, image: &RgbImage) -> InputTensor {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::CatmullRom);
        Array4::from_shape_fn((1, size as usize, size as usize, 3), |(_, y, x, c)| {
            resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        })
    }
}
