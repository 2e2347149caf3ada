//! Shared test utilities for integration tests
//!
//! A deterministic inference backend, an in-memory image fetcher and
//! helpers to assemble services and routers around them.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imgly_segment_api::{
    config::{DegenerateMaskPolicy, InferenceConfig},
    error::{Result, SegmentError},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
    processor::{BackendType, SegmentationProcessor},
    server::{create_router, AppState},
    services::{ImageFetcher, OutputSink},
    service::SegmentationService,
};
use ndarray::Array4;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Model input edge used by tests to keep inference cheap
pub const TEST_INPUT_SIZE: u32 = 32;

/// Request body limit used by test routers
pub const TEST_MAX_REQUEST_BYTES: usize = 4096;

/// Mask shape produced by [`StubBackend`]
#[derive(Debug, Clone, Copy)]
pub enum StubMask {
    /// Horizontal ramp from 0.0 at the left edge to 1.0 at the right edge
    Ramp,
    /// Same value everywhere
    Uniform(f32),
}

/// Inference backend returning a synthetic mask at the input resolution
#[derive(Debug)]
pub struct StubBackend {
    mask: StubMask,
    initialized: bool,
    fail_inference: bool,
}

impl StubBackend {
    pub fn new(mask: StubMask) -> Self {
        Self {
            mask,
            initialized: false,
            fail_inference: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_inference: true,
            ..Self::new(StubMask::Ramp)
        }
    }
}

impl InferenceBackend for StubBackend {
    fn initialize(&mut self, _config: &InferenceConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(SegmentError::internal("Stub backend not initialized"));
        }
        if self.fail_inference {
            return Err(SegmentError::inference("Stub inference failure"));
        }

        let (_, _, height, width) = input.dim();
        let mask = self.mask;
        Ok(Array4::from_shape_fn((1, 1, height, width), |(_, _, _, x)| {
            match mask {
                StubMask::Ramp if width > 1 => x as f32 / (width - 1) as f32,
                StubMask::Ramp => 0.0,
                StubMask::Uniform(value) => value,
            }
        }))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        let size = TEST_INPUT_SIZE as usize;
        (1, 3, size, size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        let size = TEST_INPUT_SIZE as usize;
        (1, 1, size, size)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "stub-rmbg".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// What a [`StaticFetcher`] answers with
#[derive(Debug, Clone)]
pub enum FetchReply {
    Bytes(Vec<u8>),
    Unreachable,
}

/// Fetcher serving fixed content and recording requested URLs
#[derive(Debug)]
pub struct StaticFetcher {
    reply: FetchReply,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new(reply: FetchReply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn serving(bytes: Vec<u8>) -> Self {
        Self::new(FetchReply::Bytes(bytes))
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(&self, url: &reqwest::Url) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        match &self.reply {
            FetchReply::Bytes(bytes) => Ok(bytes.clone()),
            FetchReply::Unreachable => Err(SegmentError::network_error(
                format!("Failed to fetch {url}"),
                "connection refused",
            )),
        }
    }
}

pub fn test_preprocessing() -> PreprocessingConfig {
    PreprocessingConfig {
        target_size: [TEST_INPUT_SIZE, TEST_INPUT_SIZE],
        ..PreprocessingConfig::default()
    }
}

/// Initialized processor around `backend`
pub fn processor_with(
    backend: StubBackend,
    policy: DegenerateMaskPolicy,
) -> SegmentationProcessor {
    let mut processor = SegmentationProcessor::new(Box::new(backend), test_preprocessing(), policy);
    processor
        .initialize(&InferenceConfig::default())
        .expect("stub backend initializes");
    processor
}

pub fn service_with(
    backend: StubBackend,
    fetcher: Arc<dyn ImageFetcher>,
    sink: Arc<dyn OutputSink>,
) -> SegmentationService {
    SegmentationService::new(
        processor_with(backend, DegenerateMaskPolicy::Opaque),
        fetcher,
        sink,
        BackendType::Onnx,
    )
}

pub fn router_for(service: SegmentationService) -> Router {
    create_router(AppState::new(service), TEST_MAX_REQUEST_BYTES)
}

/// Colorful RGB test image
pub fn sample_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("test image encodes");
    bytes
}

pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(sample_rgb(width, height)), ImageFormat::Png)
}
