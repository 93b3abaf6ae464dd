use crate::align::{reproject_by_template, WarpSettings};
use crate::error::{RegionRasterError, Result};
use crate::files::list_filepaths;
use crate::raster::Extent;
use crate::tool::{ensure_output, OutputMode, ToolInvocation};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSize {
    pub width: usize,
    pub height: usize,
}

/// Extent of the first layer of a vector source.
pub fn vector_extent(path: &Path) -> Result<Extent> {
    let dataset = Dataset::open(path)?;
    let layer = dataset
        .layer(0)
        .map_err(|_| RegionRasterError::NoLayers(path.to_path_buf()))?;

    let envelope = layer.get_extent()?;
    debug!(
        "Vector extent of {}: x [{}, {}], y [{}, {}], srs {}",
        path.display(),
        envelope.MinX,
        envelope.MaxX,
        envelope.MinY,
        envelope.MaxY,
        layer
            .spatial_ref()
            .and_then(|sr| sr.to_proj4().ok())
            .unwrap_or_else(|| "unknown".to_string())
    );

    Ok(Extent::new(
        envelope.MinX,
        envelope.MinY,
        envelope.MaxX,
        envelope.MaxY,
    ))
}

/// Pixel dimensions of `extent` at `target_res`, truncated toward zero.
///
/// A resolution coarser than either side of the extent would give an empty
/// raster and is rejected.
pub fn raster_size_for(extent: &Extent, target_res: f64) -> Result<RasterSize> {
    if !target_res.is_finite() || target_res <= 0.0 {
        return Err(RegionRasterError::InvalidResolution(target_res));
    }

    let width = (extent.width() / target_res).floor() as usize;
    let height = (extent.height() / target_res).floor() as usize;

    if width == 0 || height == 0 {
        return Err(RegionRasterError::InvalidRasterSize {
            res: target_res,
            width,
            height,
        });
    }

    Ok(RasterSize { width, height })
}

pub fn build_rasterize_invocation(
    vector: &Path,
    output: &Path,
    extent: &Extent,
    size: RasterSize,
) -> ToolInvocation {
    let (xmin, ymin, xmax, ymax) = extent.normalized();
    ToolInvocation::new("gdal_rasterize")
        .arg("-te")
        .args([xmin, ymin, xmax, ymax])
        .arg("-ts")
        .args([size.width, size.height])
        .args(["-ot", "Byte", "-of", "GTiff", "-co", "COMPRESS=LZW"])
        .args(["-init", "0", "-burn", "1"])
        .path_arg(vector)
        .path_arg(output)
}

/// Burn a vector boundary into a byte raster: 1 inside the polygons, 0 outside.
///
/// The grid is anchored to the vector's own extent, so the output still has to
/// be aligned to an analysis template before it can be compared pixel by pixel.
pub fn rasterize_shapefile(
    vector: &Path,
    output: &Path,
    target_res: f64,
    mode: OutputMode,
) -> Result<RasterSize> {
    info!("Rasterizing {} at {}", vector.display(), target_res);

    let extent = vector_extent(vector)?;
    let size = raster_size_for(&extent, target_res)?;
    info!("Output size: {}x{}", size.width, size.height);

    build_rasterize_invocation(vector, output, &extent, size).run(mode)?;
    ensure_output(output)?;

    Ok(size)
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Written(PathBuf),
    Skipped(PathBuf),
}

impl BatchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            BatchOutcome::Written(p) | BatchOutcome::Skipped(p) => p,
        }
    }
}

/// Rasterize every shapefile in `shp_dir` and align each mask to `template`.
///
/// Each output is `<out_dir>/<shapefile stem>.tif`; existing outputs are left
/// alone. The intermediate rasterization lives in a fresh temporary directory
/// per shapefile.
pub fn rasterize_regions(
    shp_dir: &Path,
    template: &Path,
    out_dir: &Path,
    target_res: f64,
    mode: OutputMode,
) -> Result<Vec<BatchOutcome>> {
    fs::create_dir_all(out_dir)?;
    let shapefiles = list_filepaths(shp_dir, &[".shp"], &[".aux", ".xml"], true)?;

    let mut warp = WarpSettings::new(target_res);
    warp.output_mode = mode;

    let mut outcomes = Vec::with_capacity(shapefiles.len());
    for shp in shapefiles {
        let stem = file_stem(&shp);
        let output = out_dir.join(format!("{}.tif", stem));

        if output.exists() {
            info!("Output file already exists: {}", output.display());
            outcomes.push(BatchOutcome::Skipped(output));
            continue;
        }

        info!("Processing: {}", shp.display());
        let scratch = tempfile::Builder::new()
            .prefix("rasterize-")
            .tempdir_in(out_dir)?;
        let tmp_path = scratch.path().join(format!("{}.tif", stem));

        rasterize_shapefile(&shp, &tmp_path, target_res, mode)?;
        reproject_by_template(&tmp_path, template, &output, &warp)?;
        scratch.close()?;

        outcomes.push(BatchOutcome::Written(output));
    }

    Ok(outcomes)
}

/// File name up to the first `.`, e.g. `regions.shp.xml` -> `regions`.
pub(crate) fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_boundary_size() {
        let extent = Extent::new(0.0, 0.0, 100.0, 100.0);
        let size = raster_size_for(&extent, 10.0).unwrap();
        assert_eq!(
            size,
            RasterSize {
                width: 10,
                height: 10
            }
        );
    }

    #[test]
    fn test_size_truncates() {
        let extent = Extent::new(0.0, 0.0, 105.0, 59.0);
        let size = raster_size_for(&extent, 10.0).unwrap();
        assert_eq!(size.width, 10);
        assert_eq!(size.height, 5);
    }

    #[test]
    fn test_resolution_larger_than_extent_rejected() {
        let extent = Extent::new(0.0, 0.0, 100.0, 5.0);
        assert!(matches!(
            raster_size_for(&extent, 10.0),
            Err(RegionRasterError::InvalidRasterSize {
                width: 10,
                height: 0,
                ..
            })
        ));
        assert!(matches!(
            raster_size_for(&extent, 0.0),
            Err(RegionRasterError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_rasterize_arguments() {
        let extent = Extent::new(0.0, 0.0, 100.0, 100.0);
        let size = RasterSize {
            width: 10,
            height: 10,
        };
        let inv = build_rasterize_invocation(
            Path::new("region.shp"),
            Path::new("region.tif"),
            &extent,
            size,
        );
        assert_eq!(
            inv.command_line(),
            "gdal_rasterize -te 0 0 100 100 -ts 10 10 -ot Byte -of GTiff \
             -co COMPRESS=LZW -init 0 -burn 1 region.shp region.tif"
        );
    }

    #[test]
    fn test_sweep_skips_existing_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let shp_dir = tmp.path().join("shp");
        let out_dir = tmp.path().join("masks");
        fs::create_dir_all(&shp_dir).unwrap();
        fs::create_dir_all(&out_dir).unwrap();
        for name in ["Wien.shp", "Wien.shp.xml", "Wien.dbf"] {
            fs::write(shp_dir.join(name), b"").unwrap();
        }
        fs::write(out_dir.join("Wien.tif"), b"").unwrap();

        let outcomes = rasterize_regions(
            &shp_dir,
            Path::new("template.tif"),
            &out_dir,
            70.0,
            OutputMode::Captured,
        )
        .unwrap();
        assert_eq!(outcomes, vec![BatchOutcome::Skipped(out_dir.join("Wien.tif"))]);
        assert_eq!(outcomes[0].path(), out_dir.join("Wien.tif"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("/a/BEV_Wien.shp")), "BEV_Wien");
        assert_eq!(file_stem(Path::new("x.tar.gz")), "x");
    }
}
