//! Conversion of command-line arguments into runtime configuration

use crate::cli::Cli;
use crate::{
    config::{CorsConfig, ServerConfig},
    models::ModelSpec,
    processor::ProcessorConfig,
    tracing_config::TracingConfig,
    utils::{ExecutionProviderManager, ModelSpecParser},
};
use anyhow::{Context, Result};

/// Builds the immutable startup configuration from parsed arguments
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn server_config(cli: &Cli) -> ServerConfig {
        ServerConfig {
            host: cli.host,
            port: cli.port,
            upload_dir: cli.upload_dir.clone(),
            max_upload_bytes: cli.max_upload_bytes,
            cors: CorsConfig {
                allowed_origins: cli.allowed_origins.clone(),
                ..CorsConfig::default()
            },
        }
    }

    /// Model spec for a non-URL `--model`, with `--variant` taking precedence
    /// over a `:variant` suffix
    pub(crate) fn model_spec(cli: &Cli) -> Result<ModelSpec> {
        let parsed = ModelSpecParser::parse(&cli.model);
        let spec = ModelSpec {
            source: parsed.source,
            variant: cli.variant.clone().or(parsed.variant),
        };
        ModelSpecParser::validate(&spec).context("Invalid model specification")?;
        Ok(spec)
    }

    pub(crate) fn processor_config(cli: &Cli, model_spec: ModelSpec) -> Result<ProcessorConfig> {
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        ProcessorConfig::builder()
            .model_spec(model_spec)
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .debug(cli.verbose >= 2)
            .intra_threads(cli.threads)
            .build()
            .context("Invalid processor configuration")
    }

    pub(crate) fn tracing_config(cli: &Cli) -> TracingConfig {
        TracingConfig::new()
            .with_verbosity(cli.verbose)
            .with_format(cli.log_format)
            .with_env_override()
    }
}
