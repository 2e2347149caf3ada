//! Output sinks for encoded result images

use crate::{
    error::{Result, SegmentError},
    types::StoredOutput,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Destination for encoded PNG results
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Persist `png` and report where it went
    ///
    /// # Errors
    /// - `Io` or `Storage` when the output cannot be written
    async fn store(&self, png: Vec<u8>) -> Result<StoredOutput>;
}

/// Writes each result to a new uniquely named file in a directory
#[derive(Debug, Clone)]
pub struct FileSystemSink {
    output_dir: PathBuf,
    prefix: String,
}

impl FileSystemSink {
    /// Create a sink writing `<prefix><uuid>.png` files into `output_dir`
    ///
    /// The directory is created if missing and stored as an absolute path.
    ///
    /// # Errors
    /// - Directory cannot be created or resolved
    pub fn new<P: AsRef<Path>, S: Into<String>>(output_dir: P, prefix: S) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)
            .map_err(|e| SegmentError::file_io_error("create output directory", output_dir, &e))?;
        let output_dir = std::fs::canonicalize(output_dir)
            .map_err(|e| SegmentError::file_io_error("resolve output directory", output_dir, &e))?;

        Ok(Self {
            output_dir,
            prefix: prefix.into(),
        })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn next_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.png", self.prefix, uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl OutputSink for FileSystemSink {
    async fn store(&self, png: Vec<u8>) -> Result<StoredOutput> {
        let path = self.next_path();

        // create_new refuses to clobber an existing file
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| SegmentError::file_io_error("create output file", &path, &e))?;

        write_or_remove(file, &path, &png).await?;

        tracing::debug!(path = %path.display(), bytes = png.len(), "Stored output image");

        Ok(StoredOutput {
            path,
            bytes_written: png.len() as u64,
        })
    }
}

/// Write `bytes` to the file at `path`, deleting it if the write fails
async fn write_or_remove<W>(mut writer: W, path: &Path, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(bytes).await {
        Ok(()) => writer
            .flush()
            .await
            .map_err(|e| SegmentError::file_io_error("flush output file", path, &e)),
        Err(e) => Err(SegmentError::file_io_error("write output file", path, &e)),
    };
    drop(writer);

    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
    written
}

/// Keeps results in memory; used by tests and embedders
#[derive(Debug, Default)]
pub struct MemorySink {
    outputs: Mutex<Vec<(PathBuf, Vec<u8>)>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored output in insertion order
    #[must_use]
    pub fn outputs(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.outputs
            .lock()
            .map(|outputs| outputs.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.lock().map(|outputs| outputs.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn store(&self, png: Vec<u8>) -> Result<StoredOutput> {
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|_| SegmentError::storage("Memory sink lock poisoned"))?;
        let path = PathBuf::from(format!("/memory/output-{}.png", outputs.len()));
        let bytes_written = png.len() as u64;
        outputs.push((path.clone(), png));
        Ok(StoredOutput {
            path,
            bytes_written,
        })
    }
}
