use crate::error::Result;
use crate::reader::{read_image, ReadOptions};
use crate::regions::RegionDescriptor;
use log::warn;
use ndarray::Array2;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaskedStatistics {
    pub mean: f64,
    pub median: f64,
    pub percentile_90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub mean: f64,
    pub median: f64,
    pub percentile_90: f64,
    pub min: f64,
    pub max: f64,
}

impl Statistics {
    pub fn masked(&self) -> MaskedStatistics {
        MaskedStatistics {
            mean: self.mean,
            median: self.median,
            percentile_90: self.percentile_90,
        }
    }
}

/// Values that are neither NaN nor one of `exclude`, sorted ascending.
pub fn retained_values(array: &Array2<f32>, exclude: &[f32]) -> Vec<f64> {
    let mut values: Vec<f64> = array
        .iter()
        .filter(|&&v| !v.is_nan() && !exclude.contains(&v))
        .map(|&v| v as f64)
        .collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Percentile of sorted data with linear interpolation between closest ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Mean, median, 90th percentile, min and max over the non-excluded values.
///
/// An input with nothing left after exclusion gives NaN everywhere and a
/// warning, never an error.
pub fn calculate_statistics(array: &Array2<f32>, exclude: &[f32]) -> Statistics {
    let values = retained_values(array, exclude);

    if values.is_empty() {
        warn!("No valid values left after excluding {:?}, statistics are NaN", exclude);
        return Statistics {
            mean: f64::NAN,
            median: f64::NAN,
            percentile_90: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
        };
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Statistics {
        mean,
        median: percentile(&values, 50.0),
        percentile_90: percentile(&values, 90.0),
        min: values[0],
        max: values[values.len() - 1],
    }
}

pub fn calculate_statistics_masked(array: &Array2<f32>, exclude: &[f32]) -> MaskedStatistics {
    calculate_statistics(array, exclude).masked()
}

/// Read a region's raster and summarise it in one go.
pub fn region_statistics(
    dir: &Path,
    region: &RegionDescriptor,
    dataset_label: &str,
    exclude: &[f32],
    options: &ReadOptions,
) -> Result<Statistics> {
    let image = read_image(dir, region, dataset_label, options)?;
    Ok(calculate_statistics(&image.array, exclude))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` edges from min to max.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Equal-width histogram of the non-excluded values.
///
/// The last bin is closed on the right. Nothing to count gives empty vectors.
pub fn histogram(array: &Array2<f32>, exclude: &[f32], bins: usize) -> Histogram {
    let values = retained_values(array, exclude);
    if values.is_empty() || bins == 0 {
        return Histogram {
            edges: Vec::new(),
            counts: Vec::new(),
        };
    }

    let (lo, hi) = (values[0], values[values.len() - 1]);
    // a constant array still gets a unit-wide range, centred on the value
    let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let width = (hi - lo) / bins as f64;

    let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
    let mut counts = vec![0; bins];
    for v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Histogram { edges, counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&sorted, 50.0), 2.5);
        assert_relative_eq!(percentile(&sorted, 90.0), 3.7);
        assert_relative_eq!(percentile(&sorted, 0.0), 1.0);
        assert_relative_eq!(percentile(&sorted, 100.0), 4.0);
    }

    #[test]
    fn test_statistics_excludes_values_and_nan() {
        let data = arr2(&[[0.0, 10.0, 20.0], [f32::NAN, 30.0, 100.0]]);
        let stats = calculate_statistics(&data, &[0.0, 100.0]);
        assert_relative_eq!(stats.mean, 20.0);
        assert_relative_eq!(stats.median, 20.0);
        assert_relative_eq!(stats.percentile_90, 28.0);
        assert_relative_eq!(stats.min, 10.0);
        assert_relative_eq!(stats.max, 30.0);
    }

    #[test]
    fn test_statistics_ordering() {
        let data = Array2::from_shape_fn((13, 11), |(r, c)| ((r * 31 + c * 17) % 47) as f32);
        let stats = calculate_statistics(&data, &[3.0]);
        assert!(stats.min <= stats.median);
        assert!(stats.median <= stats.percentile_90);
        assert!(stats.percentile_90 <= stats.max);
    }

    #[test]
    fn test_all_excluded_gives_nan() {
        let data = arr2(&[[0.0, 0.0], [f32::NAN, 0.0]]);
        let stats = calculate_statistics_masked(&data, &[0.0]);
        assert!(stats.mean.is_nan());
        assert!(stats.median.is_nan());
        assert!(stats.percentile_90.is_nan());
    }

    #[test]
    fn test_histogram_counts() {
        let data = arr2(&[[0.0, 1.0, 2.0], [3.0, 4.0, 99.0]]);
        let hist = histogram(&data, &[99.0], 4);
        assert_eq!(hist.counts, vec![1, 1, 1, 2]);
        assert_eq!(hist.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_histogram_constant_input() {
        let data = Array2::from_elem((2, 2), 5.0);
        let hist = histogram(&data, &[], 2);
        assert_eq!(hist.counts, vec![0, 4]);
    }
}
