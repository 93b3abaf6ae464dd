use crate::error::{RegionRasterError, Result};
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

/// Stand-in for NaN while the categorical raster is interpolated.
pub const DEFAULT_PLACEHOLDER: f32 = 255.0;

/// Source sampling for one output index along an axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisSample {
    lower: usize,
    upper: usize,
    weight: f64,
}

/// Endpoint-aligned linear mapping of `n_out` samples onto `n_in` samples:
/// output index `o` reads source coordinate `o * (n_in - 1) / (n_out - 1)`.
fn axis_samples(n_in: usize, n_out: usize) -> Vec<AxisSample> {
    let scale = if n_out > 1 {
        (n_in - 1) as f64 / (n_out - 1) as f64
    } else {
        1.0
    };

    (0..n_out)
        .map(|o| {
            let src = o as f64 * scale;
            let lower = (src.floor() as usize).min(n_in - 1);
            let upper = (lower + 1).min(n_in - 1);
            AxisSample {
                lower,
                upper,
                weight: src - lower as f64,
            }
        })
        .collect()
}

/// Bilinear resample of a categorical raster to `shape`, truncated to integer codes.
///
/// NaN cells are swapped for `placeholder` so they cannot poison the weighted
/// sum; any output whose stencil touches one of them, or which truncates to
/// the placeholder itself, comes back as NaN.
pub fn resample_categorical(
    data: &Array2<f32>,
    shape: (usize, usize),
    placeholder: f32,
) -> Result<Array2<f32>> {
    let (in_rows, in_cols) = data.dim();
    if in_rows == 0 || in_cols == 0 {
        return Err(RegionRasterError::InvalidDimensions(in_cols, in_rows));
    }

    let (out_rows, out_cols) = shape;
    let rows = axis_samples(in_rows, out_rows);
    let cols = axis_samples(in_cols, out_cols);
    let placeholder = placeholder as f64;

    let sample = |r: usize, c: usize| -> (f64, bool) {
        let v = data[[r, c]];
        if v.is_nan() {
            (placeholder, false)
        } else {
            (v as f64, true)
        }
    };

    let out_data: Vec<f32> = rows
        .par_iter()
        .flat_map_iter(|ry| {
            cols.iter().map(move |cx| {
                let corners = [
                    (ry.lower, cx.lower, (1.0 - ry.weight) * (1.0 - cx.weight)),
                    (ry.lower, cx.upper, (1.0 - ry.weight) * cx.weight),
                    (ry.upper, cx.lower, ry.weight * (1.0 - cx.weight)),
                    (ry.upper, cx.upper, ry.weight * cx.weight),
                ];

                let mut value = 0.0;
                let mut touches_invalid = false;
                for (r, c, w) in corners {
                    if w == 0.0 {
                        continue;
                    }
                    let (v, valid) = sample(r, c);
                    touches_invalid |= !valid;
                    value += w * v;
                }

                // equal neighbours must not lose a category to rounding noise
                if (value - value.round()).abs() < 1e-9 {
                    value = value.round();
                }
                let code = value.trunc();

                if touches_invalid || code == placeholder {
                    f32::NAN
                } else {
                    code as f32
                }
            })
        })
        .collect();

    Ok(Array2::from_shape_vec((out_rows, out_cols), out_data)?)
}

/// Upsample by repeating every pixel `factor` times along both axes.
pub fn repeat_pixels(data: &Array2<f32>, factor: usize) -> Array2<f32> {
    let (rows, cols) = data.dim();
    Array2::from_shape_fn((rows * factor, cols * factor), |(r, c)| {
        data[[r / factor, c / factor]]
    })
}

/// Bring a fine categorical raster and a coarse continuous raster onto one grid.
///
/// Both outputs have shape `scaling_factor * coarse.dim()`. The fine raster is
/// interpolated and truncated to integer codes; the coarse raster is repeated
/// so each of its values survives unchanged. The two inputs are assumed to
/// cover the same extent; that is not checked.
pub fn match_array_shape(
    fine: &Array2<f32>,
    coarse: &Array2<f32>,
    scaling_factor: usize,
    placeholder: f32,
) -> Result<(Array2<f32>, Array2<f32>)> {
    if scaling_factor == 0 {
        return Err(RegionRasterError::InvalidScalingFactor(scaling_factor));
    }

    let (coarse_rows, coarse_cols) = coarse.dim();
    if coarse_rows == 0 || coarse_cols == 0 {
        return Err(RegionRasterError::InvalidDimensions(coarse_cols, coarse_rows));
    }

    let target = (coarse_rows * scaling_factor, coarse_cols * scaling_factor);
    info!(
        "Matching shapes: fine {:?} and coarse {:?} -> {:?}",
        fine.dim(),
        coarse.dim(),
        target
    );

    let fine_matched = resample_categorical(fine, target, placeholder)?;
    let coarse_matched = repeat_pixels(coarse, scaling_factor);
    debug!("Shape matching done");

    Ok((fine_matched, coarse_matched))
}
