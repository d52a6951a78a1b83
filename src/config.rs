//! Configuration types for the server and for inference

use crate::models::ModelSpec;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default listen port when `PORT` is not set
pub const DEFAULT_PORT: u16 = 5000;

/// Maximum accepted request body (16 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Directory ensured at startup
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Origins permitted by the cross-origin policy
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] =
    &["https://your-frontend-domain.com", "http://localhost:5173"];

/// Methods permitted by the cross-origin policy
pub const DEFAULT_ALLOWED_METHODS: &[&str] = &["GET", "POST", "OPTIONS"];

/// Request headers permitted by the cross-origin policy
pub const DEFAULT_ALLOWED_HEADERS: &[&str] = &["Content-Type"];

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Configuration handed to inference backends on initialization
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Enable debug mode (additional logging)
    pub debug: bool,

    /// Model specification including source and variant
    pub model_spec: ModelSpec,
}

/// Cross-origin policy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(ToString::to_string).collect(),
            allowed_methods: DEFAULT_ALLOWED_METHODS.iter().map(ToString::to_string).collect(),
            allowed_headers: DEFAULT_ALLOWED_HEADERS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Immutable server settings built once at process start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: IpAddr,
    /// Listen port
    pub port: u16,
    /// Directory created at startup
    pub upload_dir: PathBuf,
    /// Requests with larger bodies are rejected before reaching handlers
    pub max_upload_bytes: usize,
    /// Cross-origin policy
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Address the listener binds to
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Create the upload directory if it does not exist yet
    ///
    /// # Errors
    /// - The directory cannot be created
    pub fn ensure_upload_dir(&self) -> crate::error::Result<()> {
        if !self.upload_dir.exists() {
            std::fs::create_dir_all(&self.upload_dir).map_err(|e| {
                crate::error::BgRemovalError::file_io_error(
                    "create upload directory",
                    &self.upload_dir,
                    &e,
                )
            })?;
        }
        Ok(())
    }
}
