//! Library error type
//!
//! Everything below the HTTP layer reports failures as [`BgRemovalError`];
//! the router turns them into 500 responses through `api::ApiError`.

use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BgRemovalError>;

#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Filesystem failures: upload dir, model cache, model files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoding an upload or encoding the PNG result
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The runtime failed while executing the model
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model files missing, unreadable or rejected by the runtime
    #[error("Model error: {0}")]
    Model(String),

    /// Tensor preparation or mask extraction
    #[error("Processing error: {0}")]
    Processing(String),

    /// Fetching a model repository
    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap an I/O failure with what was being done and to which path
    ///
    /// The original error kind is preserved.
    pub fn file_io_error(operation: &str, path: impl AsRef<Path>, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {operation} '{}': {error}",
                path.as_ref().display()
            ),
        ))
    }

    pub fn network_error(operation: impl AsRef<str>, cause: impl std::fmt::Display) -> Self {
        Self::Network(format!("{}: {cause}", operation.as_ref()))
    }

    /// Model failure with hints for the operator appended
    pub fn model_error_with_context(
        operation: &str,
        model_path: impl AsRef<Path>,
        error: &str,
        hints: &[&str],
    ) -> Self {
        let mut message = format!(
            "Failed to {operation} model '{}': {error}.",
            model_path.as_ref().display()
        );
        if !hints.is_empty() {
            message.push_str(" Suggestions: ");
            message.push_str(&hints.join(", "));
        }
        Self::Model(message)
    }

    /// Processing failure tagged with the pipeline stage and optional input description
    pub fn processing_stage_error(stage: &str, details: &str, input: Option<&str>) -> Self {
        let input = input.map(|info| format!(" (input: {info})")).unwrap_or_default();
        Self::Processing(format!(
            "Processing failed at stage '{stage}'{input}: {details}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_category_prefix() {
        assert_eq!(
            BgRemovalError::invalid_config("port out of range").to_string(),
            "Invalid configuration: port out of range"
        );
        assert_eq!(
            BgRemovalError::inference("session crashed").to_string(),
            "Inference error: session crashed"
        );
        assert_eq!(
            BgRemovalError::network_error("Failed to download config.json", "HTTP 404").to_string(),
            "Network error: Failed to download config.json: HTTP 404"
        );
    }

    #[test]
    fn test_file_io_error_keeps_kind_and_path() {
        let cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BgRemovalError::file_io_error("create upload directory", "/srv/uploads", &cause);

        let BgRemovalError::Io(inner) = &err else {
            panic!("expected an IO error, got {err:?}");
        };
        assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            err.to_string(),
            "IO error: Failed to create upload directory '/srv/uploads': access denied"
        );
    }

    #[test]
    fn test_model_error_hints() {
        let err = BgRemovalError::model_error_with_context(
            "load",
            "/models/isnet/onnx/model.onnx",
            "protobuf parsing failed",
            &["check that the file is a valid ONNX model"],
        );
        let message = err.to_string();
        assert!(message
            .starts_with("Model error: Failed to load model '/models/isnet/onnx/model.onnx'"));
        assert!(message.ends_with("Suggestions: check that the file is a valid ONNX model"));

        let bare = BgRemovalError::model_error_with_context("load", "m.onnx", "missing", &[]);
        assert_eq!(bare.to_string(), "Model error: Failed to load model 'm.onnx': missing.");
    }

    #[test]
    fn test_processing_stage_error() {
        let err = BgRemovalError::processing_stage_error(
            "mask extraction",
            "Invalid output tensor shape",
            Some("[1, 3, 4, 4]"),
        );
        assert_eq!(
            err.to_string(),
            "Processing error: Processing failed at stage 'mask extraction' (input: [1, 3, 4, 4]): Invalid output tensor shape"
        );
    }
}
