use crate::error::Result;
use crate::files::list_filepaths;
use crate::rasterize::BatchOutcome;
use crate::tool::{ensure_output, OutputMode, ToolInvocation};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

pub fn build_clip_invocation(
    source: &Path,
    cutline: &Path,
    output: &Path,
    target_crs: &str,
) -> ToolInvocation {
    ToolInvocation::new("gdalwarp")
        .arg("-overwrite")
        .args(["-t_srs", target_crs])
        .args(["-of", "GTiff"])
        .arg("-cutline")
        .path_arg(cutline)
        .arg("-cl")
        .arg(layer_name(cutline))
        .arg("-crop_to_cutline")
        .args(["-co", "compress=LZW"])
        .path_arg(source)
        .path_arg(output)
}

/// Crop `source` to the geometry of `cutline`, reprojected to `target_crs`.
///
/// An existing `output` is taken as already done and is not recomputed, even
/// if the source has changed since. Delete it to force a rerun.
pub fn clip_to_region(
    source: &Path,
    cutline: &Path,
    output: &Path,
    target_crs: &str,
    mode: OutputMode,
) -> Result<BatchOutcome> {
    if output.exists() {
        info!("Output file already exists: {}", output.display());
        return Ok(BatchOutcome::Skipped(output.to_path_buf()));
    }

    info!("Clipping {} to {}", source.display(), cutline.display());
    build_clip_invocation(source, cutline, output, target_crs).run(mode)?;
    ensure_output(output)?;

    Ok(BatchOutcome::Written(output.to_path_buf()))
}

/// `<source stem>_<last underscore token of the cutline stem>.tif`
///
/// `LST_mean_70m_4326.tif` clipped by `BEV_Bundeslaender_Wien.shp` becomes
/// `LST_mean_70m_4326_Wien.tif`.
pub fn clip_output_name(source: &Path, cutline: &Path) -> String {
    let cutline_stem = layer_name(cutline);
    let region = cutline_stem.rsplit('_').next().unwrap_or_default();
    format!("{}_{}.tif", layer_name(source), region)
}

/// Layer name GDAL gives a single-layer file: the name minus its last extension.
pub fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Clip `source` to every shapefile in `shp_dir`, one output per region.
pub fn clip_regions(
    source: &Path,
    shp_dir: &Path,
    out_dir: &Path,
    target_crs: &str,
    mode: OutputMode,
) -> Result<Vec<BatchOutcome>> {
    fs::create_dir_all(out_dir)?;
    let shapefiles = list_filepaths(shp_dir, &[".shp"], &[".aux", ".xml"], true)?;

    shapefiles
        .iter()
        .map(|shp| {
            let output: PathBuf = out_dir.join(clip_output_name(source, shp));
            clip_to_region(source, shp, &output, target_crs, mode)
        })
        .collect()
}
