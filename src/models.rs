//! Model specification and loading
//!
//! Models are laid out the way `HuggingFace` publishes them:
//!
//! ```text
//! <model-dir>/
//!   config.json
//!   preprocessor_config.json
//!   onnx/model.onnx        (fp32)
//!   onnx/model_fp16.onnx   (fp16)
//! ```

use crate::config::ExecutionProvider;
use crate::error::{BgRemovalError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Model source specification
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelSource {
    /// External model from filesystem path
    External(PathBuf),
    /// Downloaded model from cache by model ID
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => format!("cached:{model_id}"),
        }
    }
}

/// Complete model specification including source and optional variant
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    pub variant: Option<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Downloaded(crate::cache::ModelCache::url_to_model_id(
                crate::cache::DEFAULT_MODEL_URL,
            )),
            variant: None,
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: u64,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Preprocessing parameters read from the model's preprocessor config
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input size as `[height, width]`
    pub target_size: [u32; 2],
    /// Per-channel mean in 0-1 range
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in 0-1 range
    pub normalization_std: [f32; 3],
}

/// Model provider trait for loading models
pub trait ModelProvider: std::fmt::Debug + Send + Sync {
    /// Load model data as bytes
    ///
    /// # Errors
    /// - Model file not found or inaccessible
    fn load_model_data(&self) -> Result<Vec<u8>>;

    /// Get model information
    ///
    /// # Errors
    /// - Missing size information in the preprocessor config
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// - Missing or invalid normalization or target size values
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Get the model file path
    ///
    /// # Errors
    /// - Model path not available for this provider type
    fn get_model_path(&self) -> Result<PathBuf>;
}

/// Provider for a model directory in `HuggingFace` layout
#[derive(Debug)]
pub struct ModelDirectoryProvider {
    model_path: PathBuf,
    model_config: serde_json::Value,
    preprocessor_config: serde_json::Value,
    variant: String,
}

impl ModelDirectoryProvider {
    /// Open a model directory, choosing the variant for the execution provider
    ///
    /// # Errors
    /// - Model path does not exist or is not a directory
    /// - Missing or invalid `config.json` / `preprocessor_config.json`
    /// - Requested variant not found in the `onnx/` directory
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        variant: Option<String>,
        execution_provider: Option<ExecutionProvider>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref().to_path_buf();

        if !model_path.is_dir() {
            return Err(BgRemovalError::invalid_config(format!(
                "Model path must be an existing directory: {}",
                model_path.display()
            )));
        }

        let model_config = Self::read_json(&model_path.join("config.json"))?;
        let preprocessor_config = Self::read_json(&model_path.join("preprocessor_config.json"))?;
        let variant = Self::resolve_variant(&model_path, variant, execution_provider)?;

        tracing::debug!(
            model = %model_path.display(),
            variant = %variant,
            "Resolved model directory"
        );

        Ok(Self {
            model_path,
            model_config,
            preprocessor_config,
            variant,
        })
    }

    fn read_json(path: &Path) -> Result<serde_json::Value> {
        let content = fs::read_to_string(path).map_err(|e| {
            BgRemovalError::invalid_config(format!("Failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Variants present in the `onnx/` directory
    fn available_variants(model_path: &Path) -> Result<Vec<String>> {
        let onnx_dir = model_path.join("onnx");
        if !onnx_dir.is_dir() {
            return Err(BgRemovalError::invalid_config(format!(
                "onnx directory not found in model: {}",
                model_path.display()
            )));
        }

        let mut variants = Vec::new();
        if onnx_dir.join("model.onnx").is_file() {
            variants.push("fp32".to_string());
        }
        if onnx_dir.join("model_fp16.onnx").is_file() {
            variants.push("fp16".to_string());
        }

        if variants.is_empty() {
            return Err(BgRemovalError::invalid_config(format!(
                "No ONNX model files found in: {}",
                onnx_dir.display()
            )));
        }
        Ok(variants)
    }

    /// Pick the variant: explicit request first, then provider preference
    fn resolve_variant(
        model_path: &Path,
        requested_variant: Option<String>,
        execution_provider: Option<ExecutionProvider>,
    ) -> Result<String> {
        let available = Self::available_variants(model_path)?;

        if let Some(variant) = requested_variant {
            if available.contains(&variant) {
                return Ok(variant);
            }
            return Err(BgRemovalError::model_error_with_context(
                "load variant",
                model_path,
                &format!("variant '{variant}' not found. Available: {available:?}"),
                &["check the onnx/ directory", "omit the variant to auto-select"],
            ));
        }

        // CoreML runs fp16 graphs poorly
        let prefer_fp32 = match execution_provider {
            Some(ExecutionProvider::CoreMl) => true,
            Some(ExecutionProvider::Auto) => cfg!(target_os = "macos"),
            _ => false,
        };
        let order: [&str; 2] = if prefer_fp32 {
            ["fp32", "fp16"]
        } else {
            ["fp16", "fp32"]
        };

        order
            .iter()
            .find(|candidate| available.iter().any(|v| v == *candidate))
            .map(|v| (*v).to_string())
            .ok_or_else(|| BgRemovalError::internal("No model variant could be selected"))
    }

    fn model_file_path(&self) -> PathBuf {
        let onnx_dir = self.model_path.join("onnx");
        match self.variant.as_str() {
            "fp16" => onnx_dir.join("model_fp16.onnx"),
            _ => onnx_dir.join("model.onnx"),
        }
    }

    /// Parse `size` from the preprocessor config as `[height, width]`
    fn parse_target_size(&self) -> Result<[u32; 2]> {
        let size = self.preprocessor_config.get("size").ok_or_else(|| {
            BgRemovalError::invalid_config("Missing size in preprocessor config")
        })?;

        let dimension = |key: &str| -> Result<u32> {
            size.get(key)
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| {
                    BgRemovalError::invalid_config(format!("Missing {key} in size config"))
                })?
                .try_into()
                .map_err(|_| BgRemovalError::invalid_config(format!("{key} too large for u32")))
        };

        Ok([dimension("height")?, dimension("width")?])
    }

    /// Parse a three-channel array, converting from 0-255 to 0-1 range
    fn parse_channels(&self, key: &str) -> Result<[f32; 3]> {
        let values = self
            .preprocessor_config
            .get(key)
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!("Missing {key} in preprocessor config"))
            })?;

        let mut channels = [0.0_f32; 3];
        for (index, slot) in channels.iter_mut().enumerate() {
            let value = values
                .get(index)
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| {
                    BgRemovalError::invalid_config(format!("Invalid {key}[{index}] value"))
                })?;
            *slot = (value / 255.0) as f32;
        }
        Ok(channels)
    }

    /// Selected variant
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }
}

impl ModelProvider for ModelDirectoryProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        let model_file_path = self.model_file_path();
        fs::read(&model_file_path)
            .map_err(|e| BgRemovalError::file_io_error("read model file", &model_file_path, &e))
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let model_file_path = self.model_file_path();
        let size_bytes = fs::metadata(&model_file_path)
            .map_err(|e| BgRemovalError::file_io_error("stat model file", &model_file_path, &e))?
            .len();

        let model_type = self
            .model_config
            .get("model_type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let [height, width] = self.parse_target_size()?;

        Ok(ModelInfo {
            name: format!("{model_type}-{}", self.variant),
            precision: self.variant.clone(),
            size_bytes,
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        })
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig {
            target_size: self.parse_target_size()?,
            normalization_mean: self.parse_channels("image_mean")?,
            normalization_std: self.parse_channels("image_std")?,
        })
    }

    fn get_model_path(&self) -> Result<PathBuf> {
        Ok(self.model_file_path())
    }
}

/// Model manager for handling different model sources
#[derive(Debug)]
pub struct ModelManager {
    provider: Box<dyn ModelProvider>,
}

impl ModelManager {
    /// Create a model manager from a specification
    ///
    /// Downloaded models are looked up in the model cache; they must already
    /// be present (see [`crate::download::ModelDownloader`]).
    ///
    /// # Errors
    /// - Model directory missing or incomplete
    /// - Requested variant not available
    pub fn from_spec_with_provider(
        spec: &ModelSpec,
        execution_provider: Option<ExecutionProvider>,
    ) -> Result<Self> {
        let model_path = match &spec.source {
            ModelSource::External(path) => path.clone(),
            ModelSource::Downloaded(model_id) => {
                let cache = crate::cache::ModelCache::new()?;
                if !cache.is_model_cached(model_id) {
                    return Err(BgRemovalError::model(format!(
                        "Model '{model_id}' is not cached in {}",
                        cache.cache_dir().display()
                    )));
                }
                cache.get_model_path(model_id)
            },
        };

        let provider =
            ModelDirectoryProvider::new(model_path, spec.variant.clone(), execution_provider)?;
        Ok(Self {
            provider: Box::new(provider),
        })
    }

    /// Load the model data
    ///
    /// # Errors
    /// - Model file cannot be read
    pub fn load_model(&self) -> Result<Vec<u8>> {
        self.provider.load_model_data()
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model metadata unavailable or invalid
    pub fn get_info(&self) -> Result<ModelInfo> {
        self.provider.get_model_info()
    }

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// - Preprocessor config missing or invalid
    pub fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.provider.get_preprocessing_config()
    }

    /// Get the model file path
    ///
    /// # Errors
    /// - Path unavailable for this provider
    pub fn get_model_path(&self) -> Result<PathBuf> {
        self.provider.get_model_path()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a minimal model directory with the given ONNX variants
    pub(crate) fn write_model_dir(root: &Path, variants: &[&str]) {
        fs::write(root.join("config.json"), r#"{"model_type": "isnet"}"#).unwrap();
        fs::write(
            root.join("preprocessor_config.json"),
            r#"{
                "size": {"height": 1024, "width": 1024},
                "image_mean": [128, 128, 128],
                "image_std": [256, 256, 256]
            }"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("onnx")).unwrap();
        for variant in variants {
            let file = if *variant == "fp16" {
                "model_fp16.onnx"
            } else {
                "model.onnx"
            };
            fs::write(root.join("onnx").join(file), b"onnx-bytes").unwrap();
        }
    }

    #[test]
    fn test_display_name() {
        let external = ModelSource::External(PathBuf::from("/models/isnet"));
        assert_eq!(external.display_name(), "external:isnet");

        let cached = ModelSource::Downloaded("imgly--isnet-general-onnx".to_string());
        assert_eq!(cached.display_name(), "cached:imgly--isnet-general-onnx");
    }

    #[test]
    fn test_default_spec_points_at_default_model() {
        let spec = ModelSpec::default();
        assert_eq!(
            spec.source,
            ModelSource::Downloaded("imgly--isnet-general-onnx".to_string())
        );
        assert!(spec.variant.is_none());
    }

    #[test]
    fn test_provider_reads_preprocessing_config() {
        let temp = tempfile::tempdir().unwrap();
        write_model_dir(temp.path(), &["fp32"]);

        let provider = ModelDirectoryProvider::new(temp.path(), None, None).unwrap();
        let config = provider.get_preprocessing_config().unwrap();
        assert_eq!(config.target_size, [1024, 1024]);
        assert!((config.normalization_mean[0] - 128.0 / 255.0).abs() < f32::EPSILON);
        assert!((config.normalization_std[2] - 256.0 / 255.0).abs() < f32::EPSILON);

        let info = provider.get_model_info().unwrap();
        assert_eq!(info.name, "isnet-fp32");
        assert_eq!(info.input_shape, (1, 3, 1024, 1024));
        assert_eq!(info.output_shape, (1, 1, 1024, 1024));
        assert_eq!(info.size_bytes, b"onnx-bytes".len() as u64);
    }

    #[test]
    fn test_variant_resolution() {
        let temp = tempfile::tempdir().unwrap();
        write_model_dir(temp.path(), &["fp32", "fp16"]);

        let cpu =
            ModelDirectoryProvider::new(temp.path(), None, Some(ExecutionProvider::Cpu)).unwrap();
        assert_eq!(cpu.variant(), "fp16");

        let coreml =
            ModelDirectoryProvider::new(temp.path(), None, Some(ExecutionProvider::CoreMl))
                .unwrap();
        assert_eq!(coreml.variant(), "fp32");

        let explicit =
            ModelDirectoryProvider::new(temp.path(), Some("fp32".to_string()), None).unwrap();
        assert_eq!(explicit.variant(), "fp32");
        assert!(explicit
            .get_model_path()
            .unwrap()
            .ends_with("onnx/model.onnx"));
    }

    #[test]
    fn test_missing_variant_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        write_model_dir(temp.path(), &["fp32"]);

        let err = ModelDirectoryProvider::new(temp.path(), Some("fp16".to_string()), None)
            .unwrap_err();
        assert!(err.to_string().contains("variant 'fp16' not found"));
    }

    #[test]
    fn test_incomplete_directory_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        assert!(ModelDirectoryProvider::new(temp.path(), None, None).is_err());
        assert!(ModelDirectoryProvider::new(temp.path().join("missing"), None, None).is_err());
    }
}
