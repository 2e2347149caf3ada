//! Configuration types for the segmentation service

use crate::{
    error::{Result, SegmentError},
    models::{ModelSpec, PreprocessingConfig},
    processor::BackendType,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Default address the HTTP server listens on
pub const DEFAULT_BIND_ADDRESS: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000);

/// Default file name prefix for generated output images
pub const DEFAULT_OUTPUT_PREFIX: &str = "temp_";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(SegmentError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// What to do with a mask whose values are all identical
///
/// Min-max normalization is undefined when the model output has no range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DegenerateMaskPolicy {
    /// Keep the whole image visible (alpha 255)
    #[default]
    Opaque,
    /// Make the whole image transparent (alpha 0)
    Transparent,
}

impl DegenerateMaskPolicy {
    /// Alpha value written to every pixel of a degenerate mask
    #[must_use]
    pub fn fill_value(self) -> u8 {
        match self {
            Self::Opaque => u8::MAX,
            Self::Transparent => 0,
        }
    }
}

impl std::str::FromStr for DegenerateMaskPolicy {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "opaque" => Ok(Self::Opaque),
            "transparent" => Ok(Self::Transparent),
            other => Err(SegmentError::invalid_config(format!(
                "Unknown degenerate mask policy '{}'. Expected 'opaque' or 'transparent'",
                other
            ))),
        }
    }
}

/// Inference runtime settings shared by all backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Backend type to use for inference
    pub backend_type: BackendType,
    /// Execution provider for the ONNX backend
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

/// Complete configuration of the segmentation server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub bind_address: SocketAddr,
    /// Model to load at startup
    pub model: ModelSpec,
    /// Inference runtime settings
    pub inference: InferenceConfig,
    /// Model input preprocessing
    pub preprocessing: PreprocessingConfig,
    /// Alpha fill for masks without any value range
    pub degenerate_mask_policy: DegenerateMaskPolicy,
    /// Directory receiving generated PNG files
    pub output_dir: PathBuf,
    /// File name prefix for generated PNG files
    pub output_prefix: String,
    /// Timeout for fetching the source image, in seconds
    pub fetch_timeout_secs: u64,
    /// Largest accepted source image download, in bytes
    pub max_image_bytes: u64,
    /// Largest accepted API request body, in bytes
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            model: ModelSpec::default(),
            inference: InferenceConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            degenerate_mask_policy: DegenerateMaskPolicy::default(),
            output_dir: PathBuf::from("."),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            fetch_timeout_secs: 30,
            max_image_bytes: 50 * 1024 * 1024,
            max_request_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Load configuration from a JSON file
    ///
    /// Fields missing from the file keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SegmentError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            SegmentError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_secs == 0 || self.fetch_timeout_secs > 3600 {
            return Err(SegmentError::config_value_error(
                "fetch_timeout_secs",
                self.fetch_timeout_secs,
                "1-3600",
            ));
        }
        if self.max_image_bytes == 0 {
            return Err(SegmentError::config_value_error(
                "max_image_bytes",
                self.max_image_bytes,
                "> 0",
            ));
        }
        if self.max_request_bytes == 0 {
            return Err(SegmentError::config_value_error(
                "max_request_bytes",
                self.max_request_bytes,
                "> 0",
            ));
        }
        if self.output_prefix.contains(['/', '\\']) {
            return Err(SegmentError::invalid_config(format!(
                "output_prefix must not contain path separators: '{}'",
                self.output_prefix
            )));
        }
        self.preprocessing.validate()
    }

    /// Fetch timeout as a `Duration`
    #[must_use]
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. one loaded from a file)
    #[must_use]
    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn bind_address(mut self, address: SocketAddr) -> Self {
        self.config.bind_address = address;
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelSpec) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.inference.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.inference.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.inference.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inference.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn preprocessing(mut self, preprocessing: PreprocessingConfig) -> Self {
        self.config.preprocessing = preprocessing;
        self
    }

    #[must_use]
    pub fn degenerate_mask_policy(mut self, policy: DegenerateMaskPolicy) -> Self {
        self.config.degenerate_mask_policy = policy;
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn output_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.output_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_image_bytes(mut self, bytes: u64) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_request_bytes(mut self, bytes: usize) -> Self {
        self.config.max_request_bytes = bytes;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
