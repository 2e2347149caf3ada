//! Tensor conversion helpers shared by the processing pipeline

pub mod interpolation;
pub mod postprocessing;
pub mod preprocessing;

pub use interpolation::resize_bilinear;
pub use postprocessing::MaskPostprocessor;
pub use preprocessing::ImagePreprocessor;
