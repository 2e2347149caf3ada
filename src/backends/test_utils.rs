//! Mock backends for unit tests
//!
//! Implements `InferenceBackend` without model files so the processing
//! pipeline can be exercised end to end.

use crate::{
    config::InferenceConfig,
    error::{Result, SegmentError},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager},
    processor::{BackendFactory, BackendType},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Mask pattern produced by `MockBackend`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMask {
    /// Soft-edged disc centered in the frame, zero outside
    Circular,
    /// Same raw value everywhere
    Uniform(f32),
    /// Left-to-right ramp scaled into `[low, high]`
    Gradient { low: f32, high: f32 },
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    model_info: ModelInfo,
    mask: MockMask,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
    panics_remaining: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a mock backend producing a circular mask at 32x32
    #[must_use]
    pub fn new() -> Self {
        Self::with_mask(MockMask::Circular)
    }

    #[must_use]
    pub fn with_mask(mask: MockMask) -> Self {
        Self {
            initialized: false,
            model_info: ModelInfo {
                name: "mock-segmentation-model".to_string(),
                size_bytes: 1024 * 1024,
                input_shape: (1, 3, 32, 32),
                output_shape: (1, 1, 32, 32),
            },
            mask,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
            panics_remaining: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the model resolution
    #[must_use]
    pub fn with_resolution(mut self, height: usize, width: usize) -> Self {
        self.model_info.input_shape = (1, 3, height, width);
        self.model_info.output_shape = (1, 1, height, width);
        self
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Create a mock backend whose first `count` inferences panic
    #[must_use]
    pub fn new_panicking(count: usize) -> Self {
        let backend = Self::new();
        backend.panics_remaining.store(count, Ordering::SeqCst);
        backend
    }

    /// Create an already initialized backend
    #[must_use]
    pub fn initialized(mut self) -> Self {
        self.initialized = true;
        self
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_mock_output(&self, batch_size: usize) -> Array4<f32> {
        let (_, _, height, width) = self.model_info.output_shape;
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);

        Array4::from_shape_fn((batch_size, 1, height, width), |(_, _, y, x)| match self.mask {
            MockMask::Circular => {
                let dx = x as f32 - center_x;
                let dy = y as f32 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                ((radius - distance) / radius).clamp(0.0, 1.0)
            },
            MockMask::Uniform(value) => value,
            MockMask::Gradient { low, high } => {
                let t = if width > 1 {
                    x as f32 / (width - 1) as f32
                } else {
                    0.0
                };
                low + (high - low) * t
            },
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &InferenceConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(SegmentError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(150)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(SegmentError::internal("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(SegmentError::inference("Mock backend inference failed"));
        }
        if self
            .panics_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("Mock backend panicked during inference");
        }

        Ok(self.generate_mock_output(input.dim().0))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.input_shape
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.output_shape
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_info.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Test factory for creating mock backends
#[derive(Debug, Default)]
pub struct MockBackendFactory {
    /// Whether to create backends that fail to initialize
    pub create_failing_backends: bool,
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        if self.create_failing_backends {
            Ok(Box::new(MockBackend::new_failing_init()))
        } else {
            Ok(Box::new(MockBackend::new()))
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_failure_modes() {
        let config = InferenceConfig::default();

        let mut failing_init = MockBackend::new_failing_init();
        assert!(failing_init.initialize(&config).is_err());
        assert!(!failing_init.is_initialized());

        let mut failing_inference = MockBackend::new_failing_inference();
        failing_inference.initialize(&config).unwrap();
        let input = Array4::<f32>::zeros(failing_inference.input_shape());
        assert!(matches!(
            failing_inference.infer(&input),
            Err(SegmentError::Inference(_))
        ));
    }

    #[test]
    fn test_mock_mask_patterns() {
        let mut circular = MockBackend::new().initialized();
        let input = Array4::<f32>::zeros(circular.input_shape());
        let output = circular.infer(&input).unwrap();
        assert!(output[[0, 0, 16, 16]] > 0.9);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);

        let mut gradient = MockBackend::with_mask(MockMask::Gradient {
            low: -2.0,
            high: 6.0,
        })
        .initialized();
        let output = gradient.infer(&input).unwrap();
        assert!((output[[0, 0, 5, 0]] + 2.0).abs() < 1e-6);
        assert!((output[[0, 0, 5, 31]] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_mock_backend_resolution() {
        let backend = MockBackend::new().with_resolution(8, 12);
        assert_eq!(backend.input_shape(), (1, 3, 8, 12));
        assert_eq!(backend.output_shape(), (1, 1, 8, 12));
    }
}
