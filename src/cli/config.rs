//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{ServerConfig, ServerConfigBuilder},
    models::ModelSpec,
};
use anyhow::{Context, Result};

/// Merge the optional config file with CLI flags into a `ServerConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `ServerConfig` from CLI arguments
    ///
    /// Defaults are overridden by the config file, which is overridden by
    /// flags and their environment variables.
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let base = match &cli.config {
            Some(path) => ServerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
            None => ServerConfig::default(),
        };

        let mut builder = ServerConfigBuilder::from_config(base);

        if let Some(bind) = cli.bind {
            builder = builder.bind_address(bind);
        }
        if let Some(model) = &cli.model {
            builder = builder.model(ModelSpec::parse(model));
        }
        if let Some(backend) = cli.backend {
            builder = builder.backend_type(backend);
        }
        if let Some(provider) = cli.execution_provider {
            builder = builder.execution_provider(provider);
        }
        if let Some(threads) = cli.threads {
            builder = builder.intra_threads(threads);
        }
        if let Some(dir) = &cli.output_dir {
            builder = builder.output_dir(dir.clone());
        }
        if let Some(prefix) = &cli.output_prefix {
            builder = builder.output_prefix(prefix.clone());
        }
        if let Some(secs) = cli.fetch_timeout {
            builder = builder.fetch_timeout_secs(secs);
        }
        if let Some(policy) = cli.degenerate_mask {
            builder = builder.degenerate_mask_policy(policy);
        }

        builder.build().context("Invalid configuration")
    }
}
