//! Background removal processor
//!
//! `BackgroundRemovalProcessor` owns one inference backend and runs the
//! preprocess, infer and compose pipeline on decoded images.

use crate::{
    config::{ExecutionProvider, RemovalConfig},
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelManager, ModelSpec},
    utils::{ImagePreprocessor, Letterbox},
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use ndarray::Array4;
use std::fmt;
use std::time::Instant;
use tracing::{info_span, instrument};

/// Inference runtime that executes the model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackendType {
    /// ONNX Runtime, optionally on CUDA or CoreML
    #[default]
    Onnx,
    /// Tract, CPU only
    Tract,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Constructs backends for the processor; tests swap in a mock
pub trait BackendFactory: Send + Sync {
    /// Create a backend of the given type for a model
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// Runtimes this factory can construct
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Creates the backends enabled by cargo features
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(BgRemovalError::invalid_config(format!(
                    "{other} backend is not enabled in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}

/// Configuration for the background removal processor
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Model to load
    pub model_spec: ModelSpec,
    pub backend_type: BackendType,
    /// Device choice within the runtime
    pub execution_provider: ExecutionProvider,
    /// Log per-stage timings
    pub debug: bool,
    /// Threads per operator, 0 lets the runtime decide
    pub intra_threads: usize,
    /// Threads across operators, 0 lets the runtime decide
    pub inter_threads: usize,
}

impl ProcessorConfig {
    /// Start from defaults: ONNX Runtime, auto provider, cached default model
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    /// Settings handed to the backend on initialization
    #[must_use]
    pub fn to_removal_config(&self) -> RemovalConfig {
        RemovalConfig {
            execution_provider: self.execution_provider,
            intra_threads: self.intra_threads,
            inter_threads: self.inter_threads,
            debug: self.debug,
            model_spec: self.model_spec.clone(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            debug: false,
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

/// Fluent construction of [`ProcessorConfig`] with validation in [`Self::build`]
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// # Errors
    /// - Tract paired with anything but the CPU provider
    pub fn build(self) -> Result<ProcessorConfig> {
        if self.config.backend_type == BackendType::Tract
            && self.config.execution_provider != ExecutionProvider::Cpu
        {
            return Err(BgRemovalError::invalid_config(format!(
                "Tract backend only supports the cpu provider, got {}",
                self.config.execution_provider
            )));
        }

        Ok(self.config)
    }
}

/// Per-pixel foreground mask in original image coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Row-major alpha values, 255 = foreground
    pub data: Vec<u8>,
    /// `(width, height)`
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Alpha at `(x, y)`, transparent when out of range
    #[must_use]
    pub fn value_at(&self, x: u32, y: u32) -> u8 {
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied().unwrap_or(0)
    }
}

/// Runs background removal on decoded images
pub struct BackgroundRemovalProcessor {
    config: ProcessorConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
}

impl fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor using the backends compiled into this build
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    #[must_use]
    pub fn with_factory(config: ProcessorConfig, backend_factory: Box<dyn BackendFactory>) -> Self {
        Self {
            config,
            backend_factory,
            backend: None,
        }
    }

    /// Load the model and initialize the backend
    ///
    /// Calling this again after success is a no-op.
    ///
    /// # Errors
    /// - Model directory missing or invalid
    /// - Backend not available or failing to load the model
    pub fn initialize(&mut self) -> Result<()> {
        if self.backend.is_some() {
            return Ok(());
        }

        tracing::info!(
            model = %self.config.model_spec.source.display_name(),
            backend = %self.config.backend_type,
            provider = %self.config.execution_provider,
            "Initializing background removal processor"
        );

        let model_manager = ModelManager::from_spec_with_provider(
            &self.config.model_spec,
            Some(self.config.execution_provider),
        )?;
        let mut backend = self
            .backend_factory
            .create_backend(self.config.backend_type, model_manager)?;

        if let Some(load_time) = backend.initialize(&self.config.to_removal_config())? {
            tracing::debug!(load_ms = load_time.as_millis() as u64, "Model loaded");
        }

        self.backend = Some(backend);
        Ok(())
    }

    /// Remove the background from an image
    ///
    /// The result has the input's dimensions; alpha comes from the predicted
    /// mask and fully transparent pixels are black.
    ///
    /// # Errors
    /// - Initialization failures
    /// - Preprocessing or inference errors
    /// - Unexpected output tensor shape
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            width = image.width(),
            height = image.height()
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
        let start = Instant::now();
        let mask = self.segment(image)?;
        let result = Self::apply_background_removal(image, &mask);

        tracing::debug!(
            total_ms = start.elapsed().as_millis() as u64,
            "Background removal complete"
        );
        Ok(result)
    }

    /// Predict the foreground mask for an image
    ///
    /// # Errors
    /// - Initialization failures
    /// - Preprocessing or inference errors
    pub fn segment(&mut self, image: &DynamicImage) -> Result<SegmentationMask> {
        self.initialize()?;

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::processing("Backend not initialized"))?;

        let preprocessing_config = backend.get_preprocessing_config()?;
        let input_tensor = {
            let _span = info_span!("preprocessing").entered();
            ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?
        };

        let output_tensor = {
            let _span = info_span!("inference").entered();
            backend.infer(&input_tensor)?
        };

        let _span = info_span!("mask").entered();
        Self::tensor_to_mask(&output_tensor, image.dimensions())
    }

    /// Map the model output back onto the original image
    fn tensor_to_mask(
        tensor: &Array4<f32>,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let (batch, channels, _, mask_width) = tensor.dim();
        if batch != 1 || channels != 1 {
            return Err(BgRemovalError::processing_stage_error(
                "mask extraction",
                "Invalid output tensor shape",
                Some(&format!("{:?}", tensor.shape())),
            ));
        }

        // Undo the letterbox applied during preprocessing
        let letterbox = Letterbox::fit(original_dimensions, mask_width as u32)?;
        let (orig_width, orig_height) = original_dimensions;
        let mut mask_data = Vec::with_capacity(orig_width as usize * orig_height as usize);

        for y in 0..orig_height {
            for x in 0..orig_width {
                let (tensor_x, tensor_y) = letterbox.canvas_position(x, y);
                let value = tensor
                    .get([0, 0, tensor_y as usize, tensor_x as usize])
                    .copied()
                    .unwrap_or(0.0);
                mask_data.push((value.clamp(0.0, 1.0) * 255.0) as u8);
            }
        }

        Ok(SegmentationMask::new(mask_data, original_dimensions))
    }

    /// Use the mask as alpha; fully transparent pixels become transparent black
    fn apply_background_removal(image: &DynamicImage, mask: &SegmentationMask) -> RgbaImage {
        let mut result = image.to_rgba8();

        for (x, y, pixel) in result.enumerate_pixels_mut() {
            let alpha = mask.value_at(x, y);
            *pixel = if alpha > 0 {
                image::Rgba([pixel[0], pixel[1], pixel[2], alpha])
            } else {
                image::Rgba([0, 0, 0, 0])
            };
        }

        result
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// `true` once a backend has been created and loaded
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub fn available_backends(&self) -> Vec<BackendType> {
        self.backend_factory.available_backends()
    }
}
