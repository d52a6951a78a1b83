//! Segmentation capability used by the HTTP layer

use crate::error::{BgRemovalError, Result};
use crate::processor::{BackgroundRemovalProcessor, ProcessorConfig};
use image::DynamicImage;
use std::sync::Mutex;

/// Removes the background from a decoded image
///
/// Implementations return an RGBA image of the same size whose background
/// pixels are transparent.
pub trait Segmenter: Send + Sync {
    /// Segment `image` and return the cut-out
    ///
    /// # Errors
    /// - Model loading or inference failures
    fn segment(&self, image: &DynamicImage) -> Result<DynamicImage>;
}

/// Segmenter backed by a model and inference backend
///
/// Inference sessions need exclusive access, so calls are serialised.
#[derive(Debug)]
pub struct ModelSegmenter {
    processor: Mutex<BackgroundRemovalProcessor>,
}

impl ModelSegmenter {
    /// Wrap a processor; the model loads on first use unless [`Self::warm_up`] is called
    #[must_use]
    pub fn new(processor: BackgroundRemovalProcessor) -> Self {
        Self {
            processor: Mutex::new(processor),
        }
    }

    /// Build a segmenter from configuration with the default backends
    #[must_use]
    pub fn from_config(config: ProcessorConfig) -> Self {
        Self::new(BackgroundRemovalProcessor::new(config))
    }

    /// Load the model now instead of on the first request
    ///
    /// # Errors
    /// - Model loading failures
    pub fn warm_up(&self) -> Result<()> {
        self.lock()?.initialize()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BackgroundRemovalProcessor>> {
        self.processor
            .lock()
            .map_err(|_| BgRemovalError::internal("Segmenter lock poisoned by a panicked request"))
    }
}

impl Segmenter for ModelSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let rgba = self.lock()?.process_image(image)?;
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}
