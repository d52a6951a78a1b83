//! Seam between the processor and the inference runtimes

use crate::models::{ModelInfo, PreprocessingConfig};
use crate::{config::RemovalConfig, error::Result};
use ndarray::Array4;
use std::time::Duration;

/// A loaded segmentation model
///
/// Input is a normalized `1x3xHxW` tensor at the model's input size; output
/// is a `1x1xHxW` foreground probability map at the same size. Backends are
/// driven from one thread at a time, hence `Send` without `Sync`.
pub trait InferenceBackend: Send {
    /// Load the model; a no-op returning `None` once loaded
    ///
    /// # Errors
    /// - Model files missing or rejected by the runtime
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// # Errors
    /// - Called before [`Self::initialize`]
    /// - Runtime failure or an output that is not four-dimensional
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Input size and normalization the model was trained with
    ///
    /// # Errors
    /// - No model attached yet
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// # Errors
    /// - No model attached yet
    fn get_model_info(&self) -> Result<ModelInfo>;

    fn is_initialized(&self) -> bool;
}
