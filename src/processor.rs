//! Segmentation processor
//!
//! Owns one initialized inference backend and runs the synchronous part of
//! the pipeline: decode, preprocess, infer, postprocess and composite.
//! Only the backend call is serialized; the image stages of concurrent
//! requests run in parallel.

use crate::{
    config::{DegenerateMaskPolicy, InferenceConfig},
    error::{Result, SegmentError},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
    types::{ProcessingTimings, SegmentationMask, SegmentationResult},
    utils::{ImagePreprocessor, MaskPostprocessor},
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, span, warn, Level};

/// Backend type enumeration for runtime selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(SegmentError::invalid_config(format!(
                "Unknown backend '{other}'. Expected 'onnx' or 'tract'"
            ))),
        }
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Creates the backends enabled by cargo features
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(SegmentError::invalid_config(format!(
                    "Backend '{other}' is not enabled in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Runs decoded or encoded images through an inference backend
pub struct SegmentationProcessor {
    backend: Mutex<Box<dyn InferenceBackend>>,
    preprocessing: PreprocessingConfig,
    degenerate_mask_policy: DegenerateMaskPolicy,
}

impl std::fmt::Debug for SegmentationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationProcessor")
            .field("initialized", &self.is_initialized())
            .field("preprocessing", &self.preprocessing)
            .field("degenerate_mask_policy", &self.degenerate_mask_policy)
            .finish()
    }
}

impl SegmentationProcessor {
    /// Wrap a backend; it is initialized on first use if needed
    #[must_use]
    pub fn new(
        backend: Box<dyn InferenceBackend>,
        preprocessing: PreprocessingConfig,
        degenerate_mask_policy: DegenerateMaskPolicy,
    ) -> Self {
        Self {
            backend: Mutex::new(backend),
            preprocessing,
            degenerate_mask_policy,
        }
    }

    /// Create the configured backend through `factory` and load the model
    ///
    /// # Errors
    /// - Backend not available in this build
    /// - Model loading failures
    pub fn with_factory(
        factory: &dyn BackendFactory,
        model_manager: ModelManager,
        inference: &InferenceConfig,
        degenerate_mask_policy: DegenerateMaskPolicy,
    ) -> Result<Self> {
        let preprocessing = model_manager.get_preprocessing_config().clone();
        let backend = factory.create_backend(inference.backend_type, model_manager)?;
        let mut processor = Self::new(backend, preprocessing, degenerate_mask_policy);
        processor.initialize(inference)?;
        Ok(processor)
    }

    /// Load the model into the backend
    ///
    /// # Errors
    /// - Backend initialization failures
    pub fn initialize(&mut self, inference: &InferenceConfig) -> Result<()> {
        let backend = self
            .backend
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(load_time) = backend.initialize(inference)? {
            info!(
                backend = %inference.backend_type,
                load_ms = load_time.as_millis() as u64,
                "Model loaded"
            );
        }
        Ok(())
    }

    /// Decode encoded image bytes and segment them
    ///
    /// # Errors
    /// - `Decode` when the bytes are not a supported image
    /// - Any error of [`Self::process_image`]
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<SegmentationResult> {
        let decode_start = Instant::now();
        let image = image::load_from_memory(bytes).map_err(|e| {
            SegmentError::decode(format!("Fetched content is not a supported image: {e}"))
        })?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self.process_image(&image)?;
        result.timings.decode_ms = decode_ms;
        result.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Segment a decoded image and apply the mask as its alpha channel
    ///
    /// # Errors
    /// - Backend not initialized or inference failures
    /// - Pre/postprocessing failures
    #[instrument(
        skip(self, image),
        fields(dimensions = %format!("{}x{}", image.width(), image.height()))
    )]
    pub fn process_image(&self, image: &DynamicImage) -> Result<SegmentationResult> {
        let mut timings = ProcessingTimings::default();
        let total_start = Instant::now();
        let original_dimensions = image.dimensions();

        let input_tensor = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let tensor = ImagePreprocessor::preprocess_for_inference(image, &self.preprocessing)?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        let output_tensor = {
            let _span = span!(Level::DEBUG, "inference").entered();
            let mut backend = self.lock_backend();
            if !backend.is_initialized() {
                return Err(SegmentError::internal("Inference backend not initialized"));
            }
            let start = Instant::now();
            let tensor = backend.infer(&input_tensor)?;
            drop(backend);
            timings.inference_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        let (mask, composited) = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            let start = Instant::now();
            let mask = MaskPostprocessor::postprocess(
                &output_tensor,
                original_dimensions,
                self.degenerate_mask_policy,
            )?;
            let composited = apply_alpha_mask(image, &mask)?;
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            (mask, composited)
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        debug!(
            preprocessing_ms = timings.preprocessing_ms,
            inference_ms = timings.inference_ms,
            postprocessing_ms = timings.postprocessing_ms,
            "Segmentation complete"
        );

        Ok(SegmentationResult {
            image: composited,
            mask,
            original_dimensions,
            timings,
        })
    }

    /// Model information reported by the backend
    ///
    /// # Errors
    /// - Backend has no model metadata
    pub fn model_info(&self) -> Result<ModelInfo> {
        self.lock_backend().get_model_info()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock_backend().is_initialized()
    }

    /// A panic inside `infer` poisons the lock; the backend holds no
    /// partially updated request state, so later requests keep using it.
    fn lock_backend(&self) -> MutexGuard<'_, Box<dyn InferenceBackend>> {
        self.backend.lock().unwrap_or_else(|poisoned| {
            warn!("Inference backend panicked during an earlier request, reusing it");
            poisoned.into_inner()
        })
    }
}

/// Copy `image` as RGBA8 and replace its alpha channel with the mask
///
/// # Errors
/// - Mask dimensions differ from the image dimensions
pub fn apply_alpha_mask(image: &DynamicImage, mask: &SegmentationMask) -> Result<RgbaImage> {
    if mask.dimensions != image.dimensions() {
        return Err(SegmentError::processing(format!(
            "Mask is {}x{} but image is {}x{}",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        )));
    }

    let mut rgba = image.to_rgba8();
    for (pixel, &alpha) in rgba.pixels_mut().zip(mask.data.iter()) {
        pixel[3] = alpha;
    }
    Ok(rgba)
}
