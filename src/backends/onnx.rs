//! ONNX Runtime backend
//!
//! Runs the segmentation model through ONNX Runtime with an optional hardware
//! execution provider (CUDA, `CoreML`). Unavailable providers fall back to CPU.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::time::{Duration, Instant};

/// Segmentation model hosted in an ONNX Runtime session
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// `(name, available, description)` for each device ONNX Runtime can target here
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Default; runs on any host".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU, needs the CUDA runtime libraries".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Neural Engine / GPU on macOS".to_string(),
            ),
        ]
    }

    /// Create a backend for a specific model
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    /// Create a backend that resolves its model from the config on initialization
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cuda_provider() -> Option<ExecutionProviderDispatch> {
        let provider = CUDAExecutionProvider::default();
        OrtExecutionProvider::is_available(&provider)
            .unwrap_or(false)
            .then(|| provider.build())
    }

    fn coreml_provider() -> Option<ExecutionProviderDispatch> {
        let provider = CoreMLExecutionProvider::default();
        OrtExecutionProvider::is_available(&provider)
            .unwrap_or(false)
            .then(|| CoreMLExecutionProvider::default().with_subgraphs(true).build())
    }

    fn configure_providers(
        session_builder: SessionBuilder,
        execution_provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let providers: Vec<ExecutionProviderDispatch> = match execution_provider {
            ExecutionProvider::Auto => Self::cuda_provider()
                .into_iter()
                .chain(Self::coreml_provider())
                .collect(),
            ExecutionProvider::Cpu => Vec::new(),
            ExecutionProvider::Cuda => {
                let provider = Self::cuda_provider();
                if provider.is_none() {
                    tracing::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
                provider.into_iter().collect()
            },
            ExecutionProvider::CoreMl => {
                let provider = Self::coreml_provider();
                if provider.is_none() {
                    tracing::warn!(
                        "CoreML execution provider requested but not available, \
                         falling back to CPU"
                    );
                }
                provider.into_iter().collect()
            },
        };

        if providers.is_empty() {
            tracing::info!(requested = %execution_provider, "Using CPU execution provider");
            return Ok(session_builder);
        }

        tracing::info!(
            requested = %execution_provider,
            count = providers.len(),
            "Hardware acceleration enabled"
        );
        session_builder
            .with_execution_providers(providers)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set execution providers: {e}"))
            })
    }

    fn thread_counts(config: &RemovalConfig) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra_threads, inter_threads)
    }

    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        if self.model_manager.is_none() {
            self.model_manager = Some(ModelManager::from_spec_with_provider(
                &config.model_spec,
                Some(config.execution_provider),
            )?);
        }
        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Model manager not initialized"))?;

        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;

        let session_builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;
        let session_builder =
            Self::configure_providers(session_builder, config.execution_provider)?;

        let (intra_threads, inter_threads) = Self::thread_counts(config);
        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to enable parallel execution: {e}"))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgRemovalError::model_error_with_context(
                    "load",
                    model_manager.get_model_path().unwrap_or_default(),
                    &e.to_string(),
                    &["check that the file is a valid ONNX model"],
                )
            })?;

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        tracing::info!(
            model = %model_info.name,
            precision = %model_info.precision,
            size = %crate::cache::format_size(model_info.size_bytes),
            intra_threads,
            inter_threads,
            load_ms = model_load_time.as_millis() as u64,
            "ONNX Runtime session created"
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs; model input names vary between exports
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| BgRemovalError::processing("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::processing("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgRemovalError::processing(format!("Failed to extract output tensor: {e}"))
            })?;

        let output_shape = output_tensor.shape().to_vec();
        let &[batch, channels, height, width] = output_shape.as_slice() else {
            return Err(BgRemovalError::processing(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };

        let output_data: Vec<f32> = output_tensor.iter().copied().collect();
        let result = Array4::from_shape_vec((batch, channels, height, width), output_data)
            .map_err(|e| {
                BgRemovalError::processing(format!("Failed to reshape output tensor: {e}"))
            })?;

        tracing::debug!(
            input_shape = ?input.dim(),
            output_shape = ?result.dim(),
            inference_ms = inference_start.elapsed().as_millis() as u64,
            "ONNX inference complete"
        );

        Ok(result)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Model manager not initialized"))?
            .get_preprocessing_config()
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Model manager not initialized"))?
            .get_info()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
