use crate::error::{RegionRasterError, Result};
use crate::reader::{read_image, ReadOptions};
use crate::regions::RegionDescriptor;
use crate::render::{
    manifest_path, save_as_png, ColorMap, LayerStyle, OverlayLayer, OverlayManifest,
};
use crate::shape::{match_array_shape, DEFAULT_PLACEHOLDER};
use crate::stats::{calculate_statistics_masked, percentile, MaskedStatistics};
use log::{debug, info};
use ndarray::{Array2, Zip};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which layer decides the masked-out area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskBy {
    /// Land surface temperature below the threshold.
    Lst,
    /// Imperviousness below the threshold, missing, or the 255 fill code.
    Imd,
}

impl FromStr for MaskBy {
    type Err = RegionRasterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LST" => Ok(MaskBy::Lst),
            "IMD" => Ok(MaskBy::Imd),
            _ => Err(RegionRasterError::InvalidMaskBy(s.to_string())),
        }
    }
}

/// Mask both shape-matched layers in place; returns the mask (`true` = masked).
pub fn apply_mask(
    imd: &mut Array2<f32>,
    lst: &mut Array2<f32>,
    mask_by: MaskBy,
    mask_below: f32,
) -> Result<Array2<bool>> {
    if imd.dim() != lst.dim() {
        return Err(RegionRasterError::ShapeMismatch(imd.dim(), lst.dim()));
    }

    let mask = match mask_by {
        MaskBy::Lst => lst.mapv(|v| v < mask_below),
        MaskBy::Imd => imd.mapv(|v| v < mask_below || v.is_nan() || v == DEFAULT_PLACEHOLDER),
    };

    Zip::from(&mut *imd)
        .and(&mut *lst)
        .and(&mask)
        .for_each(|i, l, &masked| {
            if masked {
                *i = f32::NAN;
                *l = f32::NAN;
            }
        });

    info!(
        "Masked {} of {} pixels by {:?} < {}",
        mask.iter().filter(|&&m| m).count(),
        mask.len(),
        mask_by,
        mask_below
    );
    Ok(mask)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryMean {
    pub category: f64,
    pub mean: f64,
}

/// Mean of `continuous` for every distinct value of `categorical`.
///
/// Pixel pairs where the category is NaN are ignored; NaN continuous values
/// are skipped inside a category. With `filter_outliers`, categories whose
/// mean falls outside 1.5 IQR of all means are dropped. Categories listed in
/// `exclude` are removed last.
pub fn category_means(
    categorical: &Array2<f32>,
    continuous: &Array2<f32>,
    filter_outliers: bool,
    exclude: &[f32],
) -> Result<Vec<CategoryMean>> {
    if categorical.dim() != continuous.dim() {
        return Err(RegionRasterError::ShapeMismatch(
            categorical.dim(),
            continuous.dim(),
        ));
    }

    // fixed-point keys so f32 category codes order and compare exactly
    let mut sums: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for (&cat, &val) in categorical.iter().zip(continuous.iter()) {
        if cat.is_nan() {
            continue;
        }
        let entry = sums.entry(category_key(cat)).or_insert((0.0, 0));
        if !val.is_nan() {
            entry.0 += val as f64;
            entry.1 += 1;
        }
    }

    let mut means: Vec<CategoryMean> = sums
        .into_iter()
        .map(|(key, (sum, n))| CategoryMean {
            category: key as f64 / CATEGORY_SCALE,
            mean: if n > 0 { sum / n as f64 } else { f64::NAN },
        })
        .collect();
    debug!("{} categories before filtering", means.len());

    if filter_outliers {
        let mut sorted: Vec<f64> = means.iter().map(|m| m.mean).filter(|m| !m.is_nan()).collect();
        sorted.sort_by(f64::total_cmp);
        let q1 = percentile(&sorted, 25.0);
        let q3 = percentile(&sorted, 75.0);
        let iqr = q3 - q1;
        let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
        means.retain(|m| m.mean >= lower && m.mean <= upper);
    }

    means.retain(|m| !exclude.iter().any(|&e| e as f64 == m.category));
    Ok(means)
}

const CATEGORY_SCALE: f64 = 1000.0;

fn category_key(value: f32) -> i64 {
    (value as f64 * CATEGORY_SCALE).round() as i64
}

/// Write `category,mean` rows.
pub fn write_category_means_csv(path: &Path, means: &[CategoryMean]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in means {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} categories to {}", means.len(), path.display());
    Ok(())
}

/// Inputs of a masked-area comparison between imperviousness and temperature.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Dataset label of the fine categorical raster.
    pub imd_label: String,
    /// Dataset label of the coarse continuous raster.
    pub lst_label: String,
    pub imd_layer_name: String,
    pub lst_layer_name: String,
    pub mask_by: MaskBy,
    pub mask_below: f32,
    /// Colour limits of the temperature layer.
    pub lst_clim: (f32, f32),
    pub scaling_factor: usize,
    pub read: ReadOptions,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            imd_label: "IMD".to_string(),
            lst_label: "LST".to_string(),
            imd_layer_name: "Imperviousness".to_string(),
            lst_layer_name: "Land surface temperature".to_string(),
            mask_by: MaskBy::Lst,
            mask_below: 0.0,
            lst_clim: (20.0, 45.0),
            scaling_factor: 7,
            read: ReadOptions::default(),
        }
    }
}

/// Shape-matched pair: the categorical layer and the repeated continuous layer.
#[derive(Debug, Clone)]
pub struct MatchedLayers {
    pub imd: Array2<f32>,
    pub lst: Array2<f32>,
    /// Overlay bounds of the continuous layer.
    pub bounds: [[f64; 2]; 2],
}

/// Read both layers of a region and put them on the fine grid.
pub fn load_matched_layers(
    dir: &Path,
    region: &RegionDescriptor,
    settings: &AnalysisSettings,
) -> Result<MatchedLayers> {
    let imd = read_image(dir, region, &settings.imd_label, &settings.read)?;
    let lst = read_image(dir, region, &settings.lst_label, &settings.read)?;

    let (imd, lst_matched) = match_array_shape(
        &imd.array,
        &lst.array,
        settings.scaling_factor,
        DEFAULT_PLACEHOLDER,
    )?;

    Ok(MatchedLayers {
        imd,
        lst: lst_matched,
        bounds: lst.bounds,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskedAreaReport {
    pub imd: MaskedStatistics,
    pub lst: MaskedStatistics,
    pub masked_pixels: usize,
    pub manifest: PathBuf,
}

/// Mask a region by temperature or imperviousness, export both layers as PNG
/// overlays plus a manifest into `out_dir`, and summarise what is left.
pub fn analyze_masked_area(
    dir: &Path,
    region_name: &str,
    region: &RegionDescriptor,
    settings: &AnalysisSettings,
    out_dir: &Path,
) -> Result<MaskedAreaReport> {
    let MatchedLayers {
        mut imd,
        mut lst,
        bounds,
    } = load_matched_layers(dir, region, settings)?;

    let mask = apply_mask(&mut imd, &mut lst, settings.mask_by, settings.mask_below)?;

    fs::create_dir_all(out_dir)?;
    let imd_png = out_dir.join(format!("{}_masked_{}.png", region_name, settings.imd_label));
    let lst_png = out_dir.join(format!("{}_masked_{}.png", region_name, settings.lst_label));

    let imd_style = LayerStyle {
        layer_name: settings.imd_layer_name.clone(),
        color_map: "Reds".parse::<ColorMap>()?,
        clim: Some((0.0, 100.0)),
        legend: false,
        ..LayerStyle::default()
    };
    let lst_style = LayerStyle {
        layer_name: settings.lst_layer_name.clone(),
        color_map: "Spectral_r".parse::<ColorMap>()?,
        clim: Some(settings.lst_clim),
        ..LayerStyle::default()
    };

    save_as_png(&imd, &imd_png, &imd_style)?;
    save_as_png(&lst, &lst_png, &lst_style)?;

    let mut manifest = OverlayManifest::new(region_name, region);
    manifest.layers.push(OverlayLayer::new(
        imd_png,
        bounds,
        &imd_style,
        imd_style.value_range(&imd),
    ));
    manifest.layers.push(OverlayLayer::new(
        lst_png,
        bounds,
        &lst_style,
        lst_style.value_range(&lst),
    ));
    let manifest_file = manifest_path(out_dir, region_name);
    manifest.write(&manifest_file)?;

    Ok(MaskedAreaReport {
        imd: calculate_statistics_masked(&imd, &[0.0]),
        lst: calculate_statistics_masked(&lst, &[]),
        masked_pixels: mask.iter().filter(|&&m| m).count(),
        manifest: manifest_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_mask_by_parsing() {
        assert_eq!("LST".parse::<MaskBy>().unwrap(), MaskBy::Lst);
        assert_eq!("imd".parse::<MaskBy>().unwrap(), MaskBy::Imd);
        assert!(matches!(
            "NDVI".parse::<MaskBy>(),
            Err(RegionRasterError::InvalidMaskBy(_))
        ));
    }

    #[test]
    fn test_mask_by_lst() {
        let mut imd = arr2(&[[10.0, 20.0], [30.0, 40.0]]);
        let mut lst = arr2(&[[25.0, 35.0], [28.0, 40.0]]);
        let mask = apply_mask(&mut imd, &mut lst, MaskBy::Lst, 30.0).unwrap();

        assert_eq!(mask, arr2(&[[true, false], [true, false]]));
        assert!(imd[[0, 0]].is_nan() && lst[[1, 0]].is_nan());
        assert_eq!(imd[[0, 1]], 20.0);
        assert_eq!(lst[[1, 1]], 40.0);
    }

    #[test]
    fn test_mask_by_imd_includes_fill_and_nan() {
        let mut imd = arr2(&[[60.0, 255.0], [f32::NAN, 10.0]]);
        let mut lst = arr2(&[[30.0, 31.0], [32.0, 33.0]]);
        let mask = apply_mask(&mut imd, &mut lst, MaskBy::Imd, 50.0).unwrap();

        assert_eq!(mask, arr2(&[[false, true], [true, true]]));
        assert_eq!(lst[[0, 0]], 30.0);
        assert!(lst[[0, 1]].is_nan() && lst[[1, 1]].is_nan());
    }

    #[test]
    fn test_category_means() {
        let imd = arr2(&[[0.0, 0.0, 50.0], [50.0, 100.0, f32::NAN]]);
        let lst = arr2(&[[20.0, 22.0, 30.0], [f32::NAN, 40.0, 99.0]]);
        let means = category_means(&imd, &lst, false, &[]).unwrap();

        assert_eq!(means.len(), 3);
        assert_relative_eq!(means[0].category, 0.0);
        assert_relative_eq!(means[0].mean, 21.0);
        assert_relative_eq!(means[1].category, 50.0);
        assert_relative_eq!(means[1].mean, 30.0);
        assert_relative_eq!(means[2].mean, 40.0);

        let filtered = category_means(&imd, &lst, false, &[0.0, 100.0]).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_relative_eq!(filtered[0].category, 50.0);
    }

    #[test]
    fn test_category_means_outlier_filter() {
        let imd = arr2(&[[1.0, 2.0, 3.0, 4.0, 5.0]]);
        let lst = arr2(&[[20.0, 21.0, 22.0, 23.0, 90.0]]);
        let means = category_means(&imd, &lst, true, &[]).unwrap();
        assert_eq!(means.len(), 4);
        assert!(means.iter().all(|m| m.category != 5.0));
    }

    #[test]
    fn test_csv_output() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("means.csv");
        let rows = [
            CategoryMean {
                category: 10.0,
                mean: 25.5,
            },
            CategoryMean {
                category: 20.0,
                mean: 27.0,
            },
        ];
        write_category_means_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "category,mean\n10.0,25.5\n20.0,27.0\n");
    }
}
