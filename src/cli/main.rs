//! Server bootstrap: parse arguments, load the model, serve HTTP

use super::config::CliConfigBuilder;
use crate::{
    api::{build_router, AppState},
    cache::{ModelCache, DEFAULT_MODEL_URL},
    config::{DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT, DEFAULT_UPLOAD_DIR},
    download::ModelDownloader,
    models::{ModelSource, ModelSpec},
    segmenter::ModelSegmenter,
    tracing_config::TracingFormat,
    utils::{ExecutionProviderManager, ModelSpecParser},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Background removal HTTP service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-server")]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory created at startup
    #[arg(long, env = "UPLOAD_DIR", default_value = DEFAULT_UPLOAD_DIR)]
    pub upload_dir: PathBuf,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Origin allowed to call the API from a browser (repeatable or comma separated)
    #[arg(
        long = "allowed-origin",
        env = "CORS_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = default_origins()
    )]
    pub allowed_origins: Vec<String>,

    /// Model URL, cached model ID, or path to a model folder; `:variant` suffix allowed
    #[arg(short, long, env = "BGREMOVE_MODEL", default_value = DEFAULT_MODEL_URL)]
    pub model: String,

    /// Model variant (fp16, fp32) [default: chosen from the execution provider]
    #[arg(long, env = "BGREMOVE_MODEL_VARIANT")]
    pub variant: Option<String>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, env = "BGREMOVE_EXECUTION_PROVIDER", default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, env = "BGREMOVE_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (console, compact, json)
    #[arg(long, env = "BGREMOVE_LOG_FORMAT", default_value = "console")]
    pub log_format: TracingFormat,

    /// Show execution provider availability and exit
    #[arg(long)]
    pub list_providers: bool,
}

fn default_origins() -> Vec<String> {
    crate::config::DEFAULT_ALLOWED_ORIGINS
        .iter()
        .map(ToString::to_string)
        .collect()
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    CliConfigBuilder::tracing_config(&cli)
        .init()
        .context("Failed to initialize tracing")?;

    if cli.list_providers {
        show_providers();
        return Ok(());
    }

    run(cli).await
}

/// Start the server and serve until Ctrl-C
///
/// # Errors
/// - Invalid configuration
/// - The model cannot be downloaded or loaded
/// - The listener cannot bind
pub async fn run(cli: Cli) -> Result<()> {
    let server_config = CliConfigBuilder::server_config(&cli);
    server_config
        .ensure_upload_dir()
        .context("Failed to prepare upload directory")?;

    let model_spec = resolve_model(&cli).await?;
    let processor_config = CliConfigBuilder::processor_config(&cli, model_spec)?;
    info!(
        model = %processor_config.model_spec.source.display_name(),
        backend = %processor_config.backend_type,
        provider = %processor_config.execution_provider,
        "Loading model"
    );

    let segmenter = Arc::new(ModelSegmenter::from_config(processor_config));
    let start = Instant::now();
    let warm = Arc::clone(&segmenter);
    tokio::task::spawn_blocking(move || warm.warm_up())
        .await
        .context("Model loading task failed")?
        .context("Failed to load model")?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Model ready");

    let app = build_router(AppState::new(segmenter), &server_config);

    let addr = server_config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Background removal API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Turn `--model` into a loadable spec, downloading URLs into the cache first
async fn resolve_model(cli: &Cli) -> Result<ModelSpec> {
    if let Some(url) = ModelSpecParser::download_url(&cli.model) {
        let downloader = ModelDownloader::new().context("Failed to create model downloader")?;
        let model_id = downloader
            .download_model(url)
            .await
            .with_context(|| format!("Failed to download model from {url}"))?;
        return Ok(ModelSpec {
            source: ModelSource::Downloaded(model_id),
            variant: cli.variant.clone(),
        });
    }

    let spec = CliConfigBuilder::model_spec(cli)?;
    if let ModelSource::Downloaded(model_id) = &spec.source {
        let cache = ModelCache::new().context("Failed to open model cache")?;
        if !cache.is_model_cached(model_id) {
            anyhow::bail!(
                "Model '{model_id}' not found in cache {}. Pass a model URL to download it.",
                cache.cache_dir().display()
            );
        }
    }
    Ok(spec)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn show_providers() {
    println!("Execution providers:");
    for provider in ExecutionProviderManager::list_all_providers() {
        let status = if provider.available {
            "available"
        } else {
            "not available"
        };
        println!("  {:<12} {:<14} {}", provider.name, status, provider.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["bgremove-server"]).unwrap();
        assert_eq!(cli.model, DEFAULT_MODEL_URL);
        assert_eq!(cli.execution_provider, "onnx:auto");
        assert_eq!(cli.threads, 0);
        assert!(!cli.list_providers);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["bgremove-server", "--port", "not-a-port"]).is_err());
        assert!(Cli::try_parse_from(["bgremove-server", "--host", "localhost"]).is_err());
        assert!(Cli::try_parse_from(["bgremove-server", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_verify_command() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn test_uncached_model_id_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "bgremove-server",
            "--model",
            "nobody--missing-model",
        ])
        .unwrap();

        std::env::set_var(crate::cache::CACHE_DIR_ENV, temp.path());
        let err = resolve_model(&cli).await.unwrap_err();
        std::env::remove_var(crate::cache::CACHE_DIR_ENV);

        assert!(err.to_string().contains("not found in cache"));
    }
}
