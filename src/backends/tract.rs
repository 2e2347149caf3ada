//! Tract backend for the segmentation model
//!
//! Pure Rust inference with no native dependencies. CPU only; the
//! execution provider setting is ignored.

use crate::config::InferenceConfig;
use crate::error::{Result, SegmentError};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager};
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

use instant::{Duration, Instant};

/// Tract backend for running the segmentation model with pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// List Tract execution providers with availability status and descriptions
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Create an uninitialized backend for the given model
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn load_model(&mut self, config: &InferenceConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let Some(ref model_manager) = self.model_manager else {
            return Err(SegmentError::model(
                "No model manager available for Tract backend",
            ));
        };

        let model_data = model_manager.load_model()?;
        let model_info = model_manager.get_info()?;

        #[allow(clippy::cast_precision_loss)]
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!(
            "Initializing Tract backend with model {} ({size_mb:.2} MB)",
            model_info.name
        );
        if config.execution_provider != crate::config::ExecutionProvider::Auto {
            log::debug!(
                "Tract runs on CPU only, ignoring execution provider '{}'",
                config.execution_provider
            );
        }

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| SegmentError::model(format!("Failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| SegmentError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| SegmentError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &InferenceConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| SegmentError::internal("Tract model not initialized"))?;

        log::debug!("Running Tract inference on input {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| SegmentError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| SegmentError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            SegmentError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let output_shape = output_data.shape().to_vec();
        let &[batch, channels, height, width] = output_shape.as_slice() else {
            return Err(SegmentError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };

        let output_array = Array4::from_shape_vec(
            (batch, channels, height, width),
            output_data.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| SegmentError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .as_ref()
            .and_then(|manager| manager.get_info().ok())
            .map_or((1, 3, 1024, 1024), |info| info.input_shape)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .as_ref()
            .and_then(|manager| manager.get_info().ok())
            .map_or((1, 1, 1024, 1024), |info| info.output_shape)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| SegmentError::internal("Model manager not initialized"))?;
        model_manager.get_info()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PreprocessingConfig;

    fn fake_model_manager(dir: &std::path::Path, target_size: [u32; 2]) -> ModelManager {
        let model_path = dir.join("model.onnx");
        std::fs::write(&model_path, b"definitely not protobuf").unwrap();
        let preprocessing = PreprocessingConfig {
            target_size,
            ..PreprocessingConfig::default()
        };
        ModelManager::with_external_model(&model_path, preprocessing).unwrap()
    }

    #[test]
    fn test_tract_list_providers() {
        let providers = TractBackend::list_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].0, "CPU");
        assert!(providers[0].1);
    }

    #[test]
    fn test_tract_shapes_follow_preprocessing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = TractBackend::with_model_manager(fake_model_manager(dir.path(), [512, 768]));

        assert_eq!(backend.input_shape(), (1, 3, 512, 768));
        assert_eq!(backend.output_shape(), (1, 1, 512, 768));
        assert_eq!(backend.get_model_info().unwrap().name, "model");
    }

    #[test]
    fn test_tract_initialization_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend =
            TractBackend::with_model_manager(fake_model_manager(dir.path(), [1024, 1024]));

        let err = backend.initialize(&InferenceConfig::default()).unwrap_err();
        assert!(matches!(err, SegmentError::Model(_)));
        assert!(!backend.is_initialized());

        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(backend.infer(&input).is_err());
    }
}
