//! Model specification and loading

use crate::{
    cache::ModelCache,
    error::{Result, SegmentError},
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Repository of the pretrained segmentation model served by default
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/briaai/RMBG-1.4";

/// Relative location of the ONNX graph inside a model directory
pub const MODEL_FILE: &str = "onnx/model.onnx";

/// Model source specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// ONNX file or model directory on the local filesystem
    External(PathBuf),
    /// `HuggingFace` repository URL, resolved through the model cache
    Remote(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Remote(url) => {
                format!("cached:{}", ModelCache::url_to_model_id(url))
            },
        }
    }
}

/// Model specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Remote(DEFAULT_MODEL_URL.to_string()),
        }
    }
}

impl ModelSpec {
    /// Parse a CLI model argument: URLs are remote, anything else is a path
    #[must_use]
    pub fn parse(arg: &str) -> Self {
        let source = if arg.starts_with("http://") || arg.starts_with("https://") {
            ModelSource::Remote(arg.trim_end_matches('/').to_string())
        } else {
            ModelSource::External(PathBuf::from(arg))
        };
        Self { source }
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: u64,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Input preprocessing parameters of the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Model input resolution as `[height, width]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [1024, 1024],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }
}

impl PreprocessingConfig {
    /// Validate the preprocessing parameters
    pub fn validate(&self) -> Result<()> {
        if self.target_size.iter().any(|&s| s == 0 || s > 8192) {
            return Err(SegmentError::invalid_config(format!(
                "target_size must be within 1-8192, got {:?}",
                self.target_size
            )));
        }
        if self
            .normalization_std
            .iter()
            .any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(SegmentError::invalid_config(format!(
                "normalization_std must be positive, got {:?}",
                self.normalization_std
            )));
        }
        if self.normalization_mean.iter().any(|m| !m.is_finite()) {
            return Err(SegmentError::invalid_config(
                "normalization_mean must be finite",
            ));
        }
        Ok(())
    }
}

/// Resolves a `ModelSpec` to an ONNX file and exposes its metadata
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    name: String,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model specification against the given cache
    pub fn from_spec(
        spec: &ModelSpec,
        cache: &ModelCache,
        preprocessing: PreprocessingConfig,
    ) -> Result<Self> {
        let (model_path, name) = match &spec.source {
            ModelSource::External(path) => {
                return Self::with_external_model(path, preprocessing);
            },
            ModelSource::Remote(url) => {
                let model_id = ModelCache::url_to_model_id(url);
                if !cache.is_model_cached(&model_id) {
                    return Err(SegmentError::model(format!(
                        "Model '{}' is not cached. Download it first from {}",
                        model_id, url
                    )));
                }
                (cache.model_file_path(&model_id), model_id)
            },
        };

        Ok(Self {
            model_path,
            name,
            preprocessing,
        })
    }

    /// Use an ONNX file directly
    pub fn with_external_model<P: AsRef<Path>>(
        path: P,
        preprocessing: PreprocessingConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let model_path = Self::resolve_model_file(path)?;
        let name = path
            .file_stem()
            .map_or_else(|| "external".to_string(), |s| s.to_string_lossy().into_owned());

        Ok(Self {
            model_path,
            name,
            preprocessing,
        })
    }

    /// Find the ONNX graph for a file or model directory
    fn resolve_model_file(path: &Path) -> Result<PathBuf> {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        if path.is_dir() {
            for candidate in [path.join(MODEL_FILE), path.join("model.onnx")] {
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(SegmentError::model(format!(
            "No ONNX model found at '{}'",
            path.display()
        )))
    }

    /// Load model data as bytes
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_path)
            .map_err(|e| SegmentError::file_io_error("read model file", &self.model_path, &e))
    }

    /// Get model information
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.model_path)
            .map_err(|e| SegmentError::file_io_error("inspect model file", &self.model_path, &e))?
            .len();
        let [height, width] = self.preprocessing.target_size;

        Ok(ModelInfo {
            name: self.name.clone(),
            size_bytes,
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        })
    }

    /// Get preprocessing configuration
    #[must_use]
    pub fn get_preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Get the model file path
    #[must_use]
    pub fn get_model_path(&self) -> &Path {
        &self.model_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_argument() {
        let spec = ModelSpec::parse("https://huggingface.co/briaai/RMBG-1.4/");
        assert_eq!(
            spec.source,
            ModelSource::Remote("https://huggingface.co/briaai/RMBG-1.4".to_string())
        );

        let spec = ModelSpec::parse("./models/rmbg.onnx");
        assert_eq!(
            spec.source,
            ModelSource::External(PathBuf::from("./models/rmbg.onnx"))
        );
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            ModelSpec::default().source.display_name(),
            "cached:briaai--RMBG-1.4"
        );
        let external = ModelSource::External(PathBuf::from("/tmp/rmbg.onnx"));
        assert_eq!(external.display_name(), "external:rmbg.onnx");
    }

    #[test]
    fn test_preprocessing_validation() {
        assert!(PreprocessingConfig::default().validate().is_ok());

        let mut config = PreprocessingConfig::default();
        config.target_size = [0, 1024];
        assert!(config.validate().is_err());

        let mut config = PreprocessingConfig::default();
        config.normalization_std = [1.0, 0.0, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_external_model_directory_resolution() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("onnx")).unwrap();
        fs::write(dir.path().join(MODEL_FILE), b"fake-onnx").unwrap();

        let manager =
            ModelManager::with_external_model(dir.path(), PreprocessingConfig::default()).unwrap();
        assert_eq!(manager.get_model_path(), dir.path().join(MODEL_FILE));
        assert_eq!(manager.load_model().unwrap(), b"fake-onnx");

        let info = manager.get_info().unwrap();
        assert_eq!(info.size_bytes, 9);
        assert_eq!(info.input_shape, (1, 3, 1024, 1024));
        assert_eq!(info.output_shape, (1, 1, 1024, 1024));
    }

    #[test]
    fn test_missing_external_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelManager::with_external_model(
            dir.path().join("missing.onnx"),
            PreprocessingConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SegmentError::Model(_)));
    }

    #[test]
    fn test_remote_model_requires_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::with_dir(dir.path());
        let err = ModelManager::from_spec(
            &ModelSpec::default(),
            &cache,
            PreprocessingConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not cached"));
    }
}
