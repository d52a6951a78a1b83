//! Mock backends for testing the processing pipeline without model files

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
    processor::{BackendFactory, BackendType},
};
use ndarray::Array4;
use std::time::Duration;

const MOCK_INPUT_SIZE: u32 = 32;

/// Mock backend returning a constant mask
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    mask_value: f32,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    /// Backend whose output is `mask_value` everywhere
    #[must_use]
    pub fn constant(mask_value: f32) -> Self {
        Self {
            initialized: false,
            mask_value,
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    #[must_use]
    pub fn failing_init() -> Self {
        Self {
            should_fail_init: true,
            ..Self::constant(1.0)
        }
    }

    #[must_use]
    pub fn failing_inference() -> Self {
        Self {
            should_fail_inference: true,
            ..Self::constant(1.0)
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock backend inference failed"));
        }

        let (batch, _, height, width) = input.dim();
        Ok(Array4::from_elem((batch, 1, height, width), self.mask_value))
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig {
            target_size: [MOCK_INPUT_SIZE, MOCK_INPUT_SIZE],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        })
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let size = MOCK_INPUT_SIZE as usize;
        Ok(ModelInfo {
            name: "mock-model".to_string(),
            precision: "fp32".to_string(),
            size_bytes: 1024,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out clones of a template mock backend
#[derive(Debug)]
pub struct MockBackendFactory {
    template: MockBackend,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(template: MockBackend) -> Self {
        Self { template }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(self.template.clone()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_requires_initialization() {
        let mut backend = MockBackend::constant(0.5);
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(backend.infer(&input).is_err());

        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_some());
        assert!(backend.initialize(&RemovalConfig::default()).unwrap().is_none());

        let output = backend.infer(&input).unwrap();
        assert_eq!(output.dim(), (1, 1, 4, 4));
        assert!(output.iter().all(|&v| (v - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_failing_mocks() {
        let mut backend = MockBackend::failing_init();
        assert!(backend.initialize(&RemovalConfig::default()).is_err());

        let mut backend = MockBackend::failing_inference();
        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 2, 2))).is_err());
    }
}
