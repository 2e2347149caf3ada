//! Image to tensor conversion for model input

use crate::{
    error::{Result, SegmentError},
    models::PreprocessingConfig,
    utils::interpolation::resize_bilinear,
};
use image::{DynamicImage, GenericImageView};
use ndarray::{Array3, Array4, Axis};

/// Converts decoded images into normalized NCHW model input
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Build the `(1, 3, H, W)` input tensor for an image
    ///
    /// Grayscale images are resized as a single plane and broadcast to three
    /// channels afterwards. Any alpha channel is dropped. Pixel values are
    /// scaled to `[0, 1]` after resizing and then normalized per channel
    /// with `(v - mean) / std`.
    ///
    /// # Errors
    /// - Image has a zero dimension
    /// - Preprocessing configuration is invalid
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        config.validate()?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SegmentError::processing_stage_error(
                "preprocessing",
                "image has a zero dimension",
                Some(&format!("{width}x{height}")),
            ));
        }

        let planes = Self::to_planes(image)?;
        let [target_height, target_width] = config.target_size;
        let resized = resize_bilinear(planes.view(), target_height as usize, target_width as usize);

        let single_plane = resized.len_of(Axis(0)) == 1;
        let mean = config.normalization_mean;
        let std = config.normalization_std;

        let tensor = Array4::from_shape_fn(
            (1, 3, target_height as usize, target_width as usize),
            |(_, c, y, x)| {
                let source_channel = if single_plane { 0 } else { c };
                let value = resized[[source_channel, y, x]] / 255.0;
                (value - mean[c]) / std[c]
            },
        );

        log::debug!(
            "Preprocessed {}x{} {} image into tensor {:?}",
            width,
            height,
            if single_plane { "grayscale" } else { "color" },
            tensor.dim()
        );

        Ok(tensor)
    }

    /// Channel-first planes with raw `[0, 255]` values
    fn to_planes(image: &DynamicImage) -> Result<Array3<f32>> {
        let (width, height) = image.dimensions();
        let (channels, raw) = if Self::is_grayscale(image) {
            (1, image.to_luma8().into_raw())
        } else {
            (3, image.to_rgb8().into_raw())
        };

        let hwc = Array3::from_shape_vec((height as usize, width as usize, channels), raw)
            .map_err(|e| {
                SegmentError::processing(format!("Failed to build pixel array: {e}"))
            })?;

        Ok(hwc.mapv(f32::from).permuted_axes([2, 0, 1]).as_standard_layout().into_owned())
    }

    fn is_grayscale(image: &DynamicImage) -> bool {
        !image.color().has_color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn small_config(height: u32, width: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [height, width],
            ..PreprocessingConfig::default()
        }
    }

    #[test]
    fn test_color_image_tensor_shape_and_normalization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 6, Rgb([255, 0, 51])));
        let tensor =
            ImagePreprocessor::preprocess_for_inference(&image, &small_config(16, 8)).unwrap();

        assert_eq!(tensor.dim(), (1, 3, 16, 8));
        assert!((tensor[[0, 0, 3, 3]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 3, 3]] + 0.5).abs() < 1e-6);
        assert!((tensor[[0, 2, 3, 3]] - (0.2 - 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_grayscale_broadcast_to_three_channels() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_fn(5, 5, |x, _| Luma([x as u8 * 50])));
        let tensor =
            ImagePreprocessor::preprocess_for_inference(&image, &small_config(9, 9)).unwrap();

        assert_eq!(tensor.dim(), (1, 3, 9, 9));
        for y in 0..9 {
            for x in 0..9 {
                let r = tensor[[0, 0, y, x]];
                assert_eq!(r, tensor[[0, 1, y, x]]);
                assert_eq!(r, tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_alpha_channel_is_dropped() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 7])));
        let tensor =
            ImagePreprocessor::preprocess_for_inference(&image, &small_config(4, 4)).unwrap();

        assert_eq!(tensor.dim(), (1, 3, 4, 4));
        assert!((tensor[[0, 0, 0, 0]] + 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_custom_normalization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])));
        let config = PreprocessingConfig {
            target_size: [2, 2],
            normalization_mean: [0.0, 0.5, 1.0],
            normalization_std: [0.5, 0.5, 0.5],
        };
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        assert!((tensor[[0, 0, 0, 0]] - 2.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 2, 0, 0]].abs() < 1e-6);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        assert!(ImagePreprocessor::preprocess_for_inference(&image, &small_config(0, 4)).is_err());
    }
}
