//! Segmentation API server
//!
//! Parses command-line flags, provisions the model and runs the HTTP server.

use super::config::CliConfigBuilder;
use crate::{
    cache::ModelCache,
    config::{DegenerateMaskPolicy, ExecutionProvider},
    download::ModelDownloader,
    models::{ModelManager, ModelSource, ModelSpec},
    processor::{BackendType, DefaultBackendFactory},
    server::{self, AppState},
    service::SegmentationService,
    tracing_config::{TracingConfig, TracingFormat, TracingGuard},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{debug, info};

/// Background segmentation HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-segment-api")]
pub struct Cli {
    /// JSON configuration file; flags given here take precedence over it
    #[arg(short, long, value_name = "FILE", env = "IMGLY_SEGMENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Socket address to listen on [default: 0.0.0.0:5000]
    #[arg(short, long, value_name = "ADDR", env = "IMGLY_SEGMENT_BIND")]
    pub bind: Option<SocketAddr>,

    /// Model repository URL or path to an ONNX file or model folder
    /// [default: <https://huggingface.co/briaai/RMBG-1.4>]
    #[arg(short, long, env = "IMGLY_SEGMENT_MODEL")]
    pub model: Option<String>,

    /// Inference backend (onnx, tract)
    #[arg(long, env = "IMGLY_SEGMENT_BACKEND")]
    pub backend: Option<BackendType>,

    /// Execution provider for the ONNX backend (auto, cpu, cuda, coreml)
    #[arg(short, long, env = "IMGLY_SEGMENT_EXECUTION_PROVIDER")]
    pub execution_provider: Option<ExecutionProvider>,

    /// Number of intra-op threads (0 = auto-detect optimal threading)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Directory receiving the generated PNG files [default: .]
    #[arg(short, long, value_name = "DIR", env = "IMGLY_SEGMENT_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// File name prefix of generated PNG files [default: temp_]
    #[arg(long)]
    pub output_prefix: Option<String>,

    /// Timeout for fetching source images, in seconds [default: 30]
    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,

    /// Alpha used when the model returns a mask without any value range (opaque, transparent)
    #[arg(long)]
    pub degenerate_mask: Option<DegenerateMaskPolicy>,

    /// Log output format (console, compact, json)
    #[arg(long, default_value = "console", env = "IMGLY_SEGMENT_LOG_FORMAT")]
    pub log_format: TracingFormat,

    /// Also write logs to this file, rotated daily
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Download the model into the cache and exit
    #[arg(long)]
    pub only_download: bool,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard = init_tracing(&cli).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    info!(
        backend = %config.inference.backend_type,
        provider = %config.inference.execution_provider,
        model = %config.model.source.display_name(),
        "Starting segmentation API"
    );
    debug!(?config, "Resolved configuration");

    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    ensure_model_available(&config.model, &cache)
        .await
        .context("Failed to ensure model is available")?;

    if cli.only_download {
        info!("Model is available in {}", cache.cache_dir().display());
        return Ok(());
    }

    let model_manager =
        ModelManager::from_spec(&config.model, &cache, config.preprocessing.clone())
            .context("Failed to resolve model")?;

    let bind_address = config.bind_address;
    let max_request_bytes = config.max_request_bytes;

    // Session creation is CPU bound and may take seconds for large models
    let service = tokio::task::spawn_blocking(move || {
        SegmentationService::from_config(&config, model_manager, &DefaultBackendFactory)
    })
    .await
    .context("Model loading task failed")?
    .context("Failed to create segmentation service")?;

    server::serve(AppState::new(service), bind_address, max_request_bytes)
        .await
        .context("Server error")?;

    Ok(())
}

/// Download a remote model into the cache unless it is already there
async fn ensure_model_available(model_spec: &ModelSpec, cache: &ModelCache) -> Result<()> {
    match &model_spec.source {
        ModelSource::External(path) => {
            anyhow::ensure!(
                path.exists(),
                "Model path '{}' does not exist",
                path.display()
            );
        },
        ModelSource::Remote(url) => {
            let model_id = ModelCache::url_to_model_id(url);
            let downloader =
                ModelDownloader::new(cache.clone()).context("Failed to create model downloader")?;
            if downloader
                .check_cached_model(&model_id)
                .context("Failed to verify cached model")?
            {
                debug!(model_id = %model_id, "Model found in cache");
                return Ok(());
            }

            ModelDownloader::validate_model_url(url).context("Invalid model URL")?;
            info!("Model '{}' not cached, downloading from {}", model_id, url);

            let downloaded_id = downloader
                .download_model(url, true)
                .await
                .context("Failed to download model")?;

            anyhow::ensure!(
                downloaded_id == model_id,
                "Downloaded model ID '{}' doesn't match expected '{}'",
                downloaded_id,
                model_id
            );
            info!("Model downloaded successfully");
        },
    }
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<TracingGuard> {
    let config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format);

    #[cfg(feature = "tracing-files")]
    let config = match &cli.log_file {
        Some(path) => config.with_output(crate::tracing_config::TracingOutput::Both(path.clone())),
        None => config,
    };

    config.init()
}

/// Display available backends and execution providers
fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("==========================================");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    #[cfg(feature = "onnx")]
    {
        println!("\nonnx (ONNX Runtime, default):");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  - {name}: {status} - {description}");
        }
    }

    #[cfg(feature = "tract")]
    {
        println!("\ntract (pure Rust):");
        for (name, available, description) in crate::backends::TractBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  - {name}: {status} - {description}");
        }
    }

    println!("\nUsage:");
    println!("  --backend onnx --execution-provider auto    # best available provider (default)");
    println!("  --backend onnx --execution-provider cuda    # NVIDIA CUDA");
    println!("  --backend onnx --execution-provider coreml  # Apple CoreML");
    println!("  --backend tract                             # pure Rust CPU inference");
}
