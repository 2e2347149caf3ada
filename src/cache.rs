//! Model cache management for downloaded models
//!
//! Downloaded models live in an XDG-compliant cache directory, one
//! sub-directory per model ID.

use crate::error::{Result, SegmentError};
use crate::models::MODEL_FILE;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "IMGLY_SEGMENT_CACHE_DIR";

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache manager
    ///
    /// Uses XDG Base Directory specification for cache location:
    /// - Linux/macOS: `~/.cache/imgly-segment-api/models/`
    /// - Windows: `%LOCALAPPDATA%/imgly-segment-api/models/`
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let cache = Self::with_dir(Self::get_cache_dir()?);
        cache.ensure_exists()?;
        Ok(cache)
    }

    /// Use an explicit cache directory
    #[must_use]
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    fn ensure_exists(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).map_err(|e| {
                SegmentError::file_io_error("create cache directory", &self.cache_dir, &e)
            })?;
        }
        Ok(())
    }

    fn get_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                SegmentError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join("imgly-segment-api")
            .join("models"))
    }

    /// Generate a model ID from a URL
    ///
    /// Converts URLs like "<https://huggingface.co/briaai/RMBG-1.4>"
    /// to cache-safe identifiers like "briaai--RMBG-1.4"
    ///
    /// # Examples
    /// ```
    /// use imgly_segment_api::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://huggingface.co/briaai/RMBG-1.4");
    /// assert_eq!(id, "briaai--RMBG-1.4");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if let Some(repo) = url.strip_prefix(prefix) {
            repo.trim_end_matches('/').replace('/', "--")
        } else {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// Check if a model is cached
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        self.model_file_path(model_id).is_file()
    }

    /// Get the path to a cached model directory (may not exist)
    #[must_use]
    pub fn get_model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Get the path to the ONNX file of a cached model (may not exist)
    #[must_use]
    pub fn model_file_path(&self, model_id: &str) -> PathBuf {
        self.get_model_path(model_id).join(MODEL_FILE)
    }

    /// Get the cache root directory
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
