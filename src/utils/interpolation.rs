//! Bilinear resampling of channel-first float planes
//!
//! Sampling follows the half-pixel convention without corner alignment
//! and without antialiasing, so downscaling reads at most two source
//! pixels per axis.

use ndarray::{Array3, ArrayView3};

/// Source taps for one output coordinate along a single axis
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisTap {
    lo: usize,
    hi: usize,
    frac: f32,
}

/// Compute the two source taps and blend weight for every output index
fn axis_taps(input_len: usize, output_len: usize) -> Vec<AxisTap> {
    let scale = input_len as f32 / output_len as f32;
    let last = input_len.saturating_sub(1);

    (0..output_len)
        .map(|dst| {
            let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
            let lo = (src.floor() as usize).min(last);
            let hi = (lo + 1).min(last);
            let frac = if lo == last { 0.0 } else { src - lo as f32 };
            AxisTap { lo, hi, frac }
        })
        .collect()
}

/// Resize a `(channels, height, width)` array to `(channels, out_height, out_width)`
///
/// Identity when the size is unchanged. An empty input yields zeros.
#[must_use]
pub fn resize_bilinear(
    input: ArrayView3<'_, f32>,
    out_height: usize,
    out_width: usize,
) -> Array3<f32> {
    let (channels, in_height, in_width) = input.dim();
    if (in_height, in_width) == (out_height, out_width) {
        return input.to_owned();
    }
    if in_height == 0 || in_width == 0 || out_height == 0 || out_width == 0 {
        return Array3::zeros((channels, out_height, out_width));
    }

    let rows = axis_taps(in_height, out_height);
    let cols = axis_taps(in_width, out_width);

    Array3::from_shape_fn((channels, out_height, out_width), |(c, y, x)| {
        let (Some(row), Some(col)) = (rows.get(y), cols.get(x)) else {
            return 0.0;
        };
        let top = lerp(input[[c, row.lo, col.lo]], input[[c, row.lo, col.hi]], col.frac);
        let bottom = lerp(input[[c, row.hi, col.lo]], input[[c, row.hi, col.hi]], col.frac);
        lerp(top, bottom, row.frac)
    })
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
