#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Segmentation API
//!
//! An HTTP service that fetches an image by URL, removes its background with
//! the RMBG-1.4 segmentation model and stores the result as a transparent PNG.
//!
//! ## Pipeline
//!
//! 1. The source URL is validated and downloaded with a size limit
//! 2. The image is resized to the model input size and normalized
//! 3. The model predicts a single-channel foreground mask
//! 4. The mask is upscaled to the original size and min-max normalized to 0..=255
//! 5. The mask becomes the alpha channel of the original image
//! 6. The RGBA result is PNG-encoded and handed to an output sink
//!
//! ## Features
//!
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Model Management**: Automatic downloading and caching of models from `HuggingFace`
//! - **Pluggable I/O**: Image fetching and result storage behind traits
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use imgly_segment_api::{
//!     DefaultBackendFactory, ModelCache, ModelManager, SegmentationService, ServerConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::builder().output_dir("/tmp/segmented").build()?;
//! let cache = ModelCache::new()?;
//! let manager = ModelManager::from_spec(&config.model, &cache, config.preprocessing.clone())?;
//!
//! let service = SegmentationService::from_config(&config, manager, &DefaultBackendFactory)?;
//! let outcome = service.segment_url("https://example.com/cat.jpg").await?;
//! println!("Result written to {}", outcome.stored.path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Server binary, tracing subscriber and download progress bars
//! - `webp-support` (default): WebP source image support
//! - `tracing-json`, `tracing-files`: JSON log output and rotated log files

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod service;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use cache::ModelCache;
pub use config::{
    DegenerateMaskPolicy, ExecutionProvider, InferenceConfig, ServerConfig, ServerConfigBuilder,
};
pub use download::ModelDownloader;
pub use error::{Result, SegmentError};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, ModelSource, ModelSpec, PreprocessingConfig};
pub use processor::{
    apply_alpha_mask, BackendFactory, BackendType, DefaultBackendFactory, SegmentationProcessor,
};
pub use server::{create_router, serve, AppState};
pub use service::SegmentationService;
pub use services::{
    validate_image_url, FileSystemSink, HttpImageFetcher, ImageFetcher, MemorySink, OutputSink,
};
pub use types::{
    ProcessingTimings, SegmentOutcome, SegmentationMask, SegmentationResult, StoredOutput,
};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat, TracingGuard, TracingOutput};
