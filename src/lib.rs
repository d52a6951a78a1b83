#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! # Background Removal HTTP Service
//!
//! An HTTP service that accepts an uploaded PNG or JPEG and returns the same
//! image as a PNG whose background is transparent.
//!
//! ## Routes
//!
//! - `GET /` reports service status
//! - `POST /remove-bg` takes a multipart `image` field and answers with a
//!   `removed_bg.png` attachment
//!
//! ## Features
//!
//! - **Multiple Backends**: ONNX Runtime (CUDA, `CoreML`, CPU) and Tract (pure Rust)
//! - **Model Management**: Automatic downloading and caching of models from `HuggingFace`
//! - **Pluggable Segmentation**: handlers depend on the [`Segmenter`] trait only
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//!
//! ## Embedding the router
//!
//! ```rust,no_run
//! use bgremove_server::{build_router, AppState, ModelSegmenter, ProcessorConfig, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::default();
//! let segmenter = Arc::new(ModelSegmenter::from_config(ProcessorConfig::default()));
//! let app = build_router(AppState::new(segmenter), &config);
//!
//! let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backends;
pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod segmenter;
pub mod services;
pub mod tracing_config;
pub mod utils;

// Public API exports
pub use api::{build_router, ApiError, AppState};
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use cache::{format_size, ModelCache};
pub use config::{CorsConfig, ExecutionProvider, RemovalConfig, ServerConfig};
pub use download::{parse_huggingface_url, validate_model_url, ModelDownloader};
pub use error::{BgRemovalError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelManager, ModelSource, ModelSpec};
pub use processor::{
    BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory,
    ProcessorConfig, ProcessorConfigBuilder, SegmentationMask,
};
pub use segmenter::{ModelSegmenter, Segmenter};
pub use services::ImageIOService;
pub use tracing_config::{TracingConfig, TracingFormat};
pub use utils::{
    ExecutionProviderManager, ImagePreprocessor, ModelSpecParser, PreprocessingOptions,
    ProviderInfo,
};
