//! I/O services around the processing pipeline
//!
//! Fetching source images and persisting results are kept behind traits,
//! separate from the synchronous image processing.

pub mod fetch;
pub mod storage;

pub use fetch::{validate_image_url, HttpImageFetcher, ImageFetcher};
pub use storage::{FileSystemSink, MemorySink, OutputSink};
