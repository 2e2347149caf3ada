//! Request-level segmentation service
//!
//! Binds a loaded model to an image fetcher and an output sink. One
//! instance is built at startup and shared by all HTTP handlers.

use crate::{
    config::ServerConfig,
    error::{Result, SegmentError},
    models::ModelManager,
    processor::{BackendFactory, BackendType, SegmentationProcessor},
    services::{validate_image_url, FileSystemSink, HttpImageFetcher, ImageFetcher, OutputSink},
    types::SegmentOutcome,
};
use instant::Instant;
use std::sync::Arc;
use tracing::{info, instrument};

/// Fetch, segment and store pipeline around one shared model
#[derive(Clone)]
pub struct SegmentationService {
    processor: Arc<SegmentationProcessor>,
    fetcher: Arc<dyn ImageFetcher>,
    sink: Arc<dyn OutputSink>,
    model_name: String,
    backend_type: BackendType,
}

impl std::fmt::Debug for SegmentationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationService")
            .field("model_name", &self.model_name)
            .field("backend_type", &self.backend_type)
            .finish_non_exhaustive()
    }
}

impl SegmentationService {
    /// Assemble a service from already constructed parts
    #[must_use]
    pub fn new(
        processor: SegmentationProcessor,
        fetcher: Arc<dyn ImageFetcher>,
        sink: Arc<dyn OutputSink>,
        backend_type: BackendType,
    ) -> Self {
        let model_name = processor
            .model_info()
            .map_or_else(|_| "unknown".to_string(), |info| info.name);

        Self {
            processor: Arc::new(processor),
            fetcher,
            sink,
            model_name,
            backend_type,
        }
    }

    /// Load the model and build the production fetcher and sink
    ///
    /// # Errors
    /// - Backend creation or model loading failures
    /// - HTTP client or output directory setup failures
    pub fn from_config(
        config: &ServerConfig,
        model_manager: ModelManager,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let processor = SegmentationProcessor::with_factory(
            factory,
            model_manager,
            &config.inference,
            config.degenerate_mask_policy,
        )?;
        let fetcher = HttpImageFetcher::new(config.fetch_timeout(), config.max_image_bytes)?;
        let sink = FileSystemSink::new(&config.output_dir, config.output_prefix.clone())?;
        info!(
            output_dir = %sink.output_dir().display(),
            "Writing results to output directory"
        );

        Ok(Self::new(
            processor,
            Arc::new(fetcher),
            Arc::new(sink),
            config.inference.backend_type,
        ))
    }

    /// Segment the image behind `raw_url` and store the result as PNG
    ///
    /// # Errors
    /// - `InvalidUrl` before any network access
    /// - `Network` or `Decode` for unusable sources
    /// - Inference, processing or storage failures
    #[instrument(skip(self), fields(model = %self.model_name))]
    pub async fn segment_url(&self, raw_url: &str) -> Result<SegmentOutcome> {
        let total_start = Instant::now();
        let url = validate_image_url(raw_url)?;

        let fetch_start = Instant::now();
        let bytes = self.fetcher.fetch(&url).await?;
        let fetch_ms = fetch_start.elapsed().as_millis() as u64;

        let processor = Arc::clone(&self.processor);
        let (png, dimensions, mut timings) = tokio::task::spawn_blocking(move || {
            let result = processor.process_bytes(&bytes)?;

            let encode_start = Instant::now();
            let png = result.to_png_bytes()?;
            let mut timings = result.timings.clone();
            timings.encode_ms = encode_start.elapsed().as_millis() as u64;
            Ok::<_, SegmentError>((png, result.dimensions(), timings))
        })
        .await
        .map_err(|e| SegmentError::internal(format!("Segmentation task failed: {e}")))??;

        let store_start = Instant::now();
        let stored = self.sink.store(png).await?;
        timings.fetch_ms = fetch_ms;
        timings.store_ms = store_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            path = %stored.path.display(),
            width = dimensions.0,
            height = dimensions.1,
            "Segmented image ({})",
            timings.summary()
        );

        Ok(SegmentOutcome {
            stored,
            dimensions,
            timings,
        })
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[must_use]
    pub fn backend_type(&self) -> BackendType {
        self.backend_type
    }
}
