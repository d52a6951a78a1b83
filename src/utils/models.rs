//! Model argument parsing

use crate::{
    cache::ModelCache,
    error::{BgRemovalError, Result},
    models::{ModelSource, ModelSpec},
};
use std::path::{Path, PathBuf};

/// Parses `--model` values into a [`ModelSpec`]
pub struct ModelSpecParser;

impl ModelSpecParser {
    /// Parse a model argument, with an optional `:variant` suffix
    ///
    /// Existing paths become external models. URLs are mapped to the cache
    /// ID they download into. Anything else is taken as a cached model ID.
    ///
    /// ```
    /// use bgremove_server::models::ModelSource;
    /// use bgremove_server::utils::ModelSpecParser;
    ///
    /// let spec = ModelSpecParser::parse("https://huggingface.co/imgly/isnet-general-onnx");
    /// assert_eq!(spec.source, ModelSource::Downloaded("imgly--isnet-general-onnx".into()));
    ///
    /// let spec = ModelSpecParser::parse("imgly--isnet-general-onnx:fp32");
    /// assert_eq!(spec.variant.as_deref(), Some("fp32"));
    /// ```
    #[must_use]
    pub fn parse(model_arg: &str) -> ModelSpec {
        if let Some(url) = Self::download_url(model_arg) {
            return ModelSpec {
                source: ModelSource::Downloaded(ModelCache::url_to_model_id(url)),
                variant: None,
            };
        }

        let (model_part, variant) = match model_arg.split_once(':') {
            Some((model_part, variant)) if !Path::new(model_arg).exists() => {
                (model_part, Some(variant.to_string()))
            },
            _ => (model_arg, None),
        };

        let source = if Path::new(model_part).exists() {
            ModelSource::External(PathBuf::from(model_part))
        } else {
            ModelSource::Downloaded(model_part.to_string())
        };

        ModelSpec { source, variant }
    }

    /// The URL to download from, if the argument is one
    #[must_use]
    pub fn download_url(model_arg: &str) -> Option<&str> {
        (model_arg.starts_with("https://") || model_arg.starts_with("http://"))
            .then_some(model_arg)
    }

    /// Check that an external path exists and IDs and variants are well-formed
    ///
    /// # Errors
    /// - Missing external directory
    /// - Empty or malformed model ID or variant
    pub fn validate(model_spec: &ModelSpec) -> Result<()> {
        let well_formed = |value: &str| {
            value
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        };

        match &model_spec.source {
            ModelSource::External(path) => {
                if !path.is_dir() {
                    return Err(BgRemovalError::invalid_config(format!(
                        "External model path must be an existing directory: {}",
                        path.display()
                    )));
                }
            },
            ModelSource::Downloaded(model_id) => {
                if model_id.is_empty() {
                    return Err(BgRemovalError::invalid_config(
                        "Downloaded model ID cannot be empty",
                    ));
                }
                if !well_formed(model_id) {
                    return Err(BgRemovalError::invalid_config(format!(
                        "Invalid characters in downloaded model ID: {model_id}"
                    )));
                }
            },
        }

        if let Some(variant) = &model_spec.variant {
            if variant.is_empty() || !well_formed(variant) {
                return Err(BgRemovalError::invalid_config(format!(
                    "Invalid model variant: '{variant}'"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_id() {
        let spec = ModelSpecParser::parse("imgly--isnet-general-onnx");
        assert_eq!(
            spec.source,
            ModelSource::Downloaded("imgly--isnet-general-onnx".to_string())
        );
        assert!(spec.variant.is_none());

        let spec = ModelSpecParser::parse("imgly--isnet-general-onnx:fp16");
        assert_eq!(
            spec.source,
            ModelSource::Downloaded("imgly--isnet-general-onnx".to_string())
        );
        assert_eq!(spec.variant.as_deref(), Some("fp16"));
    }

    #[test]
    fn test_parse_url() {
        let url = "https://huggingface.co/imgly/isnet-general-onnx";
        assert_eq!(ModelSpecParser::download_url(url), Some(url));
        assert_eq!(ModelSpecParser::download_url("imgly--isnet"), None);

        let spec = ModelSpecParser::parse(url);
        assert_eq!(
            spec.source,
            ModelSource::Downloaded("imgly--isnet-general-onnx".to_string())
        );
    }

    #[test]
    fn test_parse_existing_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().to_string_lossy().to_string();

        let spec = ModelSpecParser::parse(&path);
        assert_eq!(spec.source, ModelSource::External(temp.path().to_path_buf()));

        let spec = ModelSpecParser::parse(&format!("{path}:fp32"));
        assert_eq!(spec.source, ModelSource::External(temp.path().to_path_buf()));
        assert_eq!(spec.variant.as_deref(), Some("fp32"));
    }

    #[test]
    fn test_validate() {
        assert!(ModelSpecParser::validate(&ModelSpecParser::parse("imgly--isnet")).is_ok());
        assert!(ModelSpecParser::validate(&ModelSpecParser::parse("bad model")).is_err());
        assert!(ModelSpecParser::validate(&ModelSpecParser::parse("imgly--isnet:")).is_err());
        assert!(ModelSpecParser::validate(&ModelSpec {
            source: ModelSource::External("/nonexistent/model".into()),
            variant: None,
        })
        .is_err());
    }
}
