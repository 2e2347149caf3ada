//! Model downloading from `HuggingFace` repositories
//!
//! The ONNX graph is streamed into a temporary directory, hashed with SHA-256
//! and then moved into the cache in one rename.

use crate::cache::ModelCache;
use crate::error::{Result, SegmentError};
use crate::models::MODEL_FILE;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Name of the checksum sidecar written next to the model file
pub const CHECKSUM_FILE: &str = "model.sha256";

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

impl ModelDownloader {
    /// Create a new model downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| SegmentError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a model repository's ONNX graph into the cache
    ///
    /// Returns the model ID. Already cached models are not downloaded again.
    ///
    /// # Errors
    /// - URL is not a `HuggingFace` repository
    /// - Network errors during download
    /// - File system errors during caching
    pub async fn download_model(&self, url: &str, show_progress: bool) -> Result<String> {
        let model_id = ModelCache::url_to_model_id(url);
        log::info!("Downloading model from: {}", url);
        log::info!("Model ID: {}", model_id);

        if self.check_cached_model(&model_id)? {
            log::info!("Model already cached: {}", model_id);
            return Ok(model_id);
        }

        Self::validate_model_url(url)?;

        let temp_dir = Self::create_temp_download_dir(&model_id)?;
        let final_dir = self.cache.get_model_path(&model_id);

        let progress = if show_progress {
            Some(Self::create_progress_indicator())
        } else {
            None
        };

        let file_url = format!("{}/resolve/main/{}", url.trim_end_matches('/'), MODEL_FILE);
        let local_path = temp_dir.join(MODEL_FILE);

        match self
            .download_file(&file_url, &local_path, progress.as_ref())
            .await
        {
            Ok(digest) => {
                fs::write(temp_dir.join(CHECKSUM_FILE), format!("{digest}\n")).map_err(|e| {
                    SegmentError::file_io_error("write checksum file", &temp_dir, &e)
                })?;

                if final_dir.exists() {
                    fs::remove_dir_all(&final_dir).map_err(|e| {
                        SegmentError::file_io_error(
                            "remove existing model directory",
                            &final_dir,
                            &e,
                        )
                    })?;
                }
                if let Some(parent) = final_dir.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        SegmentError::file_io_error("create cache directory", parent, &e)
                    })?;
                }
                Self::move_dir(&temp_dir, &final_dir)?;

                if let Some(pb) = progress {
                    pb.finish_with_message(format!("✅ Downloaded {}", model_id));
                }

                log::info!("Successfully downloaded model: {} (sha256 {})", model_id, digest);
                Ok(model_id)
            },
            Err(e) => {
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        log::warn!("Failed to cleanup temp directory: {}", cleanup_err);
                    }
                }

                if let Some(pb) = progress {
                    pb.finish_with_message("❌ Download failed".to_string());
                }

                Err(e)
            },
        }
    }

    /// Only `HuggingFace` repositories are supported
    pub fn validate_model_url(url: &str) -> Result<()> {
        let Some(repo) = url.strip_prefix("https://huggingface.co/") else {
            return Err(SegmentError::invalid_config(format!(
                "Unsupported URL format: {}. Only HuggingFace repositories are supported.",
                url
            )));
        };
        let segments: Vec<&str> = repo
            .trim_end_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() != 2 {
            return Err(SegmentError::invalid_config(format!(
                "Expected a repository URL of the form https://huggingface.co/<org>/<name>, got {}",
                url
            )));
        }
        Ok(())
    }

    fn create_temp_download_dir(model_id: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!(
            "imgly-segment-{}-{}",
            model_id,
            uuid::Uuid::new_v4().simple()
        ));

        fs::create_dir_all(&temp_dir)
            .map_err(|e| SegmentError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    /// Rename, falling back to copy when the temp dir is on another filesystem
    fn move_dir(from: &Path, to: &Path) -> Result<()> {
        if fs::rename(from, to).is_ok() {
            return Ok(());
        }

        let model_dir = to.join("onnx");
        fs::create_dir_all(&model_dir)
            .map_err(|e| SegmentError::file_io_error("create model directory", &model_dir, &e))?;
        for relative in [MODEL_FILE, CHECKSUM_FILE] {
            let target = to.join(relative);
            fs::copy(from.join(relative), &target).map_err(|e| {
                SegmentError::file_io_error("move downloaded model to cache", &target, &e)
            })?;
        }
        if let Err(e) = fs::remove_dir_all(from) {
            log::warn!("Failed to cleanup temp directory: {}", e);
        }
        Ok(())
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream a single file to disk, returning its hex SHA-256
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<String> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SegmentError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SegmentError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(SegmentError::network_error(
                format!("Failed to download {}", url),
                format!("HTTP error {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| SegmentError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| SegmentError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| SegmentError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;

            if let Some(pb) = progress {
                if total_size.is_some() {
                    pb.set_position(downloaded);
                } else {
                    pb.set_message(format!(
                        "Downloaded {:.1} MB",
                        downloaded as f64 / 1_024_000.0
                    ));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| SegmentError::file_io_error("flush file", local_path, &e))?;

        log::debug!(
            "Downloaded {} bytes to {}",
            downloaded,
            local_path.display()
        );
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Verify a cached model against its checksum sidecar
    ///
    /// Returns `Ok(true)` when no sidecar exists.
    pub fn verify_cached_model(&self, model_id: &str) -> Result<bool> {
        let model_dir = self.cache.get_model_path(model_id);
        let checksum_path = model_dir.join(CHECKSUM_FILE);
        if !checksum_path.exists() {
            return Ok(true);
        }

        let expected = fs::read_to_string(&checksum_path)
            .map_err(|e| SegmentError::file_io_error("read checksum file", &checksum_path, &e))?;
        let model_path = self.cache.model_file_path(model_id);
        let contents = fs::read(&model_path).map_err(|e| {
            SegmentError::file_io_error("read file for verification", &model_path, &e)
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let actual_hash = format!("{:x}", hasher.finalize());

        if actual_hash == expected.trim() {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                model_path.display(),
                expected.trim(),
                actual_hash
            );
            Ok(false)
        }
    }

    /// Whether `model_id` is cached and intact
    ///
    /// A cached model that fails its checksum is removed so the next
    /// download starts from a clean directory.
    ///
    /// # Errors
    /// - Cached files cannot be read or removed
    pub fn check_cached_model(&self, model_id: &str) -> Result<bool> {
        if !self.cache.is_model_cached(model_id) {
            return Ok(false);
        }
        if self.verify_cached_model(model_id)? {
            return Ok(true);
        }

        let model_dir = self.cache.get_model_path(model_id);
        log::warn!(
            "Removing corrupted model cache entry: {}",
            model_dir.display()
        );
        fs::remove_dir_all(&model_dir).map_err(|e| {
            SegmentError::file_io_error("remove corrupted model directory", &model_dir, &e)
        })?;
        Ok(false)
    }
}
