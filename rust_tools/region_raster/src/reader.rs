use crate::error::Result;
use crate::files::find_unique_file;
use crate::raster::{self, RasterMetadata};
use crate::regions::RegionDescriptor;
use log::{debug, info};
use ndarray::Array2;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Projection code that must appear in the file name, e.g. `4326`.
    pub projection_marker: String,
    /// Pixels below this value are masked to NaN.
    pub mask_below: Option<f32>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            projection_marker: "4326".to_string(),
            mask_below: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RasterImage {
    pub path: PathBuf,
    /// Band 1, nodata (and thresholded pixels) as NaN.
    pub array: Array2<f32>,
    /// `[[south, west], [north, east]]`
    pub bounds: [[f64; 2]; 2],
    /// Range of valid values before any threshold masking.
    pub min_value: f32,
    pub max_value: f32,
    pub crs: String,
    /// `true` where `mask_below` masked a pixel.
    pub mask: Option<Array2<bool>>,
    pub metadata: RasterMetadata,
}

/// Open the single raster in `dir` for `region` and `dataset_label`.
///
/// The file name must contain the dataset label, the region's image label,
/// `.tif` and the projection marker; `.aux` sidecars are ignored. Zero or
/// several candidates is a lookup error.
pub fn read_image(
    dir: &Path,
    region: &RegionDescriptor,
    dataset_label: &str,
    options: &ReadOptions,
) -> Result<RasterImage> {
    let patterns = [
        dataset_label,
        region.image_label.as_str(),
        ".tif",
        options.projection_marker.as_str(),
    ];
    let path = find_unique_file(dir, &patterns, &[".aux"])?;
    info!("Reading {} for {}", dataset_label, region.image_label);

    let (mut array, metadata) = raster::read_band_f32(&path)?;
    let (min_value, max_value) = nan_min_max(&array);
    debug!("Value range: [{}, {}]", min_value, max_value);

    let mask = options.mask_below.map(|threshold| {
        let mask = array.mapv(|v| v < threshold);
        array.zip_mut_with(&mask, |v, &masked| {
            if masked {
                *v = f32::NAN;
            }
        });
        mask
    });

    Ok(RasterImage {
        bounds: metadata.extent().overlay_bounds(),
        crs: metadata.crs(),
        path,
        array,
        min_value,
        max_value,
        mask,
        metadata,
    })
}

/// NaN-aware min and max; both NaN when no value is valid.
pub fn nan_min_max(array: &Array2<f32>) -> (f32, f32) {
    array
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f32::NAN, f32::NAN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_nan_min_max() {
        let data = arr2(&[[f32::NAN, 3.0], [-1.5, 7.0]]);
        assert_eq!(nan_min_max(&data), (-1.5, 7.0));
    }

    #[test]
    fn test_nan_min_max_all_nan() {
        let data = arr2(&[[f32::NAN, f32::NAN]]);
        let (lo, hi) = nan_min_max(&data);
        assert!(lo.is_nan() && hi.is_nan());
    }

    #[test]
    fn test_default_projection_marker() {
        assert_eq!(ReadOptions::default().projection_marker, "4326");
    }
}
