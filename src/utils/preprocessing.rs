//! Image preprocessing for model inference

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [255, 255, 255],
        }
    }
}

/// Letterbox geometry shared by preprocessing and mask extraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale applied to the original image
    pub scale: f32,
    /// Size of the scaled image inside the canvas
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Offset of the scaled image inside the canvas
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    /// Fit `(width, height)` into a square of `target_size`, centred
    ///
    /// # Errors
    /// - Zero-sized input or target
    pub fn fit(original_dimensions: (u32, u32), target_size: u32) -> Result<Self> {
        let (orig_width, orig_height) = original_dimensions;
        if orig_width == 0 || orig_height == 0 || target_size == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "preprocessing",
                "image and model input dimensions must be non-zero",
                Some(&format!("{orig_width}x{orig_height} into {target_size}")),
            ));
        }

        let target_size_f32 = target_size as f32;
        let scale = (target_size_f32 / orig_width as f32).min(target_size_f32 / orig_height as f32);

        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
        })
    }

    /// Canvas pixel covering the centre of original pixel `(x, y)`
    ///
    /// Always lands inside the scaled image, never in the padding.
    #[must_use]
    pub fn canvas_position(&self, x: u32, y: u32) -> (u32, u32) {
        let column = (((x as f32 + 0.5) * self.scale) as u32).min(self.scaled_width - 1);
        let row = (((y as f32 + 0.5) * self.scale) as u32).min(self.scaled_height - 1);
        (self.offset_x + column, self.offset_y + row)
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Turn an image into a normalized NCHW tensor
    ///
    /// The image is converted to RGB, resized to fit the model input while
    /// keeping its aspect ratio, centred on a padded square canvas, and
    /// normalized with the model's mean and standard deviation.
    ///
    /// # Errors
    /// - Zero-sized image or model input
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<Array4<f32>> {
        let target_size = preprocessing_config.target_size[0];

        let rgb_image = image.to_rgb8();
        let letterbox = Letterbox::fit(rgb_image.dimensions(), target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(
            target_size,
            target_size,
            image::Rgb(options.padding_color),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        Ok(Self::canvas_to_tensor(&canvas, preprocessing_config))
    }

    fn canvas_to_tensor(
        canvas: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] =
                    (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
            }
        }

        tensor
    }

    /// Preprocess with the default white padding
    ///
    /// # Errors
    /// - Zero-sized image or model input
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        Self::preprocess_image(image, preprocessing_config, &PreprocessingOptions::default())
    }
}
