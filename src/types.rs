//! Core types for segmentation results

use crate::error::Result;
use image::RgbaImage;
use serde::Serialize;
use std::path::PathBuf;

/// 8-bit alpha mask with the original image's dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Row-major mask values (0 = background, 255 = foreground)
    pub data: Vec<u8>,
    /// Mask dimensions as `(width, height)`
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Mask filled with a single value
    #[must_use]
    pub fn filled(value: u8, dimensions: (u32, u32)) -> Self {
        let len = dimensions.0 as usize * dimensions.1 as usize;
        Self::new(vec![value; len], dimensions)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Mask value at a pixel, `None` outside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        self.data
            .get(y as usize * self.width() as usize + x as usize)
            .copied()
    }
}

/// Timing breakdown of one segmentation request, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingTimings {
    pub fetch_ms: u64,
    pub decode_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub postprocessing_ms: u64,
    pub encode_ms: u64,
    pub store_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// One-line summary for logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "fetch {}ms, decode {}ms, preprocess {}ms, inference {}ms, postprocess {}ms, encode {}ms, store {}ms, total {}ms",
            self.fetch_ms,
            self.decode_ms,
            self.preprocessing_ms,
            self.inference_ms,
            self.postprocessing_ms,
            self.encode_ms,
            self.store_ms,
            self.total_ms
        )
    }
}

/// Result of segmenting a single image
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    /// Original pixels with the mask applied as alpha
    pub image: RgbaImage,
    /// Mask used as alpha channel
    pub mask: SegmentationMask,
    /// Original image dimensions as `(width, height)`
    pub original_dimensions: (u32, u32),
    /// Stage timings recorded by the processor
    pub timings: ProcessingTimings,
}

impl SegmentationResult {
    /// Encode the composited image as PNG
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image.write_to(&mut cursor, image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Get image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Location of an output written by an output sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutput {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Outcome of a full fetch-segment-store run
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    pub stored: StoredOutput,
    pub dimensions: (u32, u32),
    pub timings: ProcessingTimings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_accessors() {
        let mask = SegmentationMask::new(vec![0, 64, 128, 255, 10, 20], (3, 2));
        assert_eq!(mask.width(), 3);
        assert_eq!(mask.height(), 2);
        assert_eq!(mask.get(1, 0), Some(64));
        assert_eq!(mask.get(0, 1), Some(255));
        assert_eq!(mask.get(3, 0), None);
        assert_eq!(mask.get(0, 2), None);
    }

    #[test]
    fn test_result_png_roundtrip_dimensions() {
        let image = RgbaImage::from_pixel(7, 3, image::Rgba([1, 2, 3, 4]));
        let result = SegmentationResult {
            image,
            mask: SegmentationMask::filled(4, (7, 3)),
            original_dimensions: (7, 3),
            timings: ProcessingTimings::default(),
        };

        let png = result.to_png_bytes().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 3));
    }
}
