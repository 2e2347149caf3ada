//! Model output to alpha mask conversion

use crate::{
    config::DegenerateMaskPolicy,
    error::{Result, SegmentError},
    types::SegmentationMask,
    utils::interpolation::resize_bilinear,
};
use ndarray::{s, Array4};

/// Converts raw model output into an 8-bit mask at the original resolution
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Upsample a `(1, 1, h, w)` output to `(height, width)` and min-max normalize it
    ///
    /// Values are mapped with `(v - min) / (max - min) * 255` and truncated to
    /// `u8`. Non-finite values are excluded from min and max and become 0.
    /// A mask with no value range is filled according to `policy`.
    ///
    /// # Errors
    /// - Tensor is not shaped `(1, 1, h, w)` with non-zero `h` and `w`
    /// - Target dimensions contain a zero
    pub fn postprocess(
        output: &Array4<f32>,
        dimensions: (u32, u32),
        policy: DegenerateMaskPolicy,
    ) -> Result<SegmentationMask> {
        let (batch, channels, mask_height, mask_width) = output.dim();
        if batch != 1 || channels != 1 || mask_height == 0 || mask_width == 0 {
            return Err(SegmentError::processing_stage_error(
                "postprocessing",
                "expected a (1, 1, h, w) model output",
                Some(&format!("{:?}", output.dim())),
            ));
        }

        let (width, height) = dimensions;
        if width == 0 || height == 0 {
            return Err(SegmentError::processing(format!(
                "Cannot build a {width}x{height} mask"
            )));
        }

        let plane = output.slice(s![0, .., .., ..]);
        let upsampled = resize_bilinear(plane, height as usize, width as usize);

        let Some((min, max)) = Self::finite_range(upsampled.iter().copied()) else {
            log::warn!("Model output has no finite values, using {policy:?} fallback mask");
            return Ok(SegmentationMask::filled(policy.fill_value(), dimensions));
        };

        let range = max - min;
        if !(range > 0.0 && range.is_finite()) {
            log::warn!(
                "Model output is constant ({min}), using {policy:?} fallback mask"
            );
            return Ok(SegmentationMask::filled(policy.fill_value(), dimensions));
        }

        let data = upsampled
            .iter()
            .map(|&v| {
                if v.is_finite() {
                    ((v - min) / range * 255.0) as u8
                } else {
                    0
                }
            })
            .collect();

        Ok(SegmentationMask::new(data, dimensions))
    }

    /// Minimum and maximum over the finite values, `None` if there are none
    fn finite_range(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
        values
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((min, max)) => Some((min.min(v), max.max(v))),
            })
    }
}
