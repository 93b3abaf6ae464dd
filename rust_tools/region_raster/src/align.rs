use crate::error::{RegionRasterError, Result};
use crate::raster::{self, RasterMetadata};
use crate::tool::{ensure_output, OutputMode, ToolInvocation, ToolOutput};
use clap::ValueEnum;
use log::{info, warn};
use std::fmt;
use std::path::Path;

/// Resampling methods understood by `gdalwarp -r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResamplingMethod {
    #[default]
    Near,
    Bilinear,
    Cubic,
    Cubicspline,
    Lanczos,
    Average,
    Rms,
    Mode,
    Max,
    Min,
    Med,
    Q1,
    Q3,
    Sum,
}

impl ResamplingMethod {
    pub fn as_gdal_str(&self) -> &'static str {
        match self {
            ResamplingMethod::Near => "near",
            ResamplingMethod::Bilinear => "bilinear",
            ResamplingMethod::Cubic => "cubic",
            ResamplingMethod::Cubicspline => "cubicspline",
            ResamplingMethod::Lanczos => "lanczos",
            ResamplingMethod::Average => "average",
            ResamplingMethod::Rms => "rms",
            ResamplingMethod::Mode => "mode",
            ResamplingMethod::Max => "max",
            ResamplingMethod::Min => "min",
            ResamplingMethod::Med => "med",
            ResamplingMethod::Q1 => "q1",
            ResamplingMethod::Q3 => "q3",
            ResamplingMethod::Sum => "sum",
        }
    }
}

impl fmt::Display for ResamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_gdal_str())
    }
}

#[derive(Debug, Clone)]
pub struct WarpSettings {
    pub target_res: f64,
    pub resampling: ResamplingMethod,
    /// Pass the source raster's nodata value as `-srcnodata`.
    pub use_src_nodata: bool,
    pub dst_nodata: Option<f64>,
    /// Extra gdalwarp arguments, placed before the generated ones.
    pub extra_args: Vec<String>,
    pub output_mode: OutputMode,
}

impl WarpSettings {
    pub fn new(target_res: f64) -> Self {
        Self {
            target_res,
            resampling: ResamplingMethod::default(),
            use_src_nodata: false,
            dst_nodata: None,
            extra_args: Vec::new(),
            output_mode: OutputMode::default(),
        }
    }
}

/// Split a free-form argument string on whitespace.
pub fn parse_extra_args(extra: &str) -> Vec<String> {
    extra.split_whitespace().map(str::to_string).collect()
}

/// Build the gdalwarp call that puts `source` on the template's grid.
pub fn build_warp_invocation(
    source: &Path,
    source_nodata: Option<f64>,
    output: &Path,
    template: &RasterMetadata,
    settings: &WarpSettings,
) -> Result<ToolInvocation> {
    if !settings.target_res.is_finite() || settings.target_res <= 0.0 {
        return Err(RegionRasterError::InvalidResolution(settings.target_res));
    }

    let (ulx, lry, lrx, uly) = template.extent().normalized();
    if lrx - ulx <= 0.0 || uly - lry <= 0.0 {
        return Err(RegionRasterError::InvalidExtent(format!(
            "template extent ({}, {}, {}, {}) has zero area",
            ulx, lry, lrx, uly
        )));
    }

    let mut invocation = ToolInvocation::new("gdalwarp").args(&settings.extra_args);

    if settings.use_src_nodata {
        match source_nodata {
            Some(nd) => invocation = invocation.arg("-srcnodata").arg(nd),
            None => warn!(
                "{} has no nodata value, not passing -srcnodata",
                source.display()
            ),
        }
    }

    if let Some(nd) = settings.dst_nodata {
        invocation = invocation.arg("-dstnodata").arg(nd);
    }

    let res = settings.target_res;
    Ok(invocation
        .arg("-tr")
        .args([res, res])
        .arg("-te")
        .args([ulx, lry, lrx, uly])
        .arg("-t_srs")
        .arg(template.crs())
        .arg("-r")
        .arg(settings.resampling)
        .args(["-of", "GTiff", "-co", "compress=LZW"])
        .path_arg(source)
        .path_arg(output))
}

/// Reproject and resample `source` onto the CRS and extent of `template`.
///
/// The output is a compressed GeoTIFF at `settings.target_res`. A failing
/// gdalwarp, or one that exits cleanly without writing `output`, is an error.
pub fn reproject_by_template(
    source: &Path,
    template: &Path,
    output: &Path,
    settings: &WarpSettings,
) -> Result<ToolOutput> {
    info!(
        "Reprojecting {} onto template {} at {} ({})",
        source.display(),
        template.display(),
        settings.target_res,
        settings.resampling
    );

    let template_meta = raster::open_metadata(template)?;
    let source_nodata = if settings.use_src_nodata {
        raster::open_metadata(source)?.nodata
    } else {
        None
    };
    let invocation =
        build_warp_invocation(source, source_nodata, output, &template_meta, settings)?;
    let result = invocation.run(settings.output_mode)?;
    ensure_output(output)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(gt: [f64; 6], nodata: Option<f64>) -> RasterMetadata {
        RasterMetadata {
            width: 10,
            height: 5,
            geotransform: gt,
            projection: "EPSG:3035".to_string(),
            nodata,
            pixel_width: gt[1].abs(),
            pixel_height: gt[5].abs(),
        }
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_warp_arguments() {
        let meta = template([1000.0, 70.0, 0.0, 2000.0, 0.0, -70.0], Some(255.0));
        let mut settings = WarpSettings::new(70.0);
        settings.use_src_nodata = true;
        settings.dst_nodata = Some(0.0);
        settings.extra_args = parse_extra_args("-overwrite  -multi");

        let inv = build_warp_invocation(
            Path::new("in.tif"),
            Some(-9999.0),
            Path::new("out.tif"),
            &meta,
            &settings,
        )
        .unwrap();
        let args = &inv.args;

        assert_eq!(inv.program, "gdalwarp");
        assert_eq!(&args[..2], &["-overwrite", "-multi"]);
        let i = position(args, "-srcnodata");
        assert_eq!(args[i + 1], "-9999");
        let i = position(args, "-dstnodata");
        assert_eq!(args[i + 1], "0");
        let i = position(args, "-tr");
        assert_eq!(&args[i + 1..i + 3], &["70", "70"]);
        let i = position(args, "-te");
        assert_eq!(&args[i + 1..i + 5], &["1000", "1650", "1700", "2000"]);
        let i = position(args, "-r");
        assert_eq!(args[i + 1], "near");
        assert_eq!(&args[args.len() - 2..], &["in.tif", "out.tif"]);
    }

    #[test]
    fn test_south_up_template_is_normalized() {
        let north_up = template([0.0, 10.0, 0.0, 50.0, 0.0, -10.0], None);
        let south_up = template([0.0, 10.0, 0.0, 0.0, 0.0, 10.0], None);
        let settings = WarpSettings::new(10.0);

        let te = |meta: &RasterMetadata| {
            let inv =
                build_warp_invocation(Path::new("a"), None, Path::new("b"), meta, &settings)
                    .unwrap();
            let i = position(&inv.args, "-te");
            inv.args[i + 1..i + 5].to_vec()
        };

        assert_eq!(te(&north_up), vec!["0", "0", "100", "50"]);
        assert_eq!(te(&north_up), te(&south_up));
    }

    #[test]
    fn test_srcnodata_skipped_without_source_nodata() {
        let meta = template([0.0, 10.0, 0.0, 50.0, 0.0, -10.0], Some(0.0));
        let mut settings = WarpSettings::new(10.0);
        settings.use_src_nodata = true;
        let inv = build_warp_invocation(Path::new("a"), None, Path::new("b"), &meta, &settings)
            .unwrap();
        assert!(!inv.args.contains(&"-srcnodata".to_string()));
    }

    #[test]
    fn test_invalid_resolution_rejected() {
        let meta = template([0.0, 10.0, 0.0, 50.0, 0.0, -10.0], None);
        for res in [0.0, -5.0, f64::NAN] {
            let settings = WarpSettings::new(res);
            assert!(matches!(
                build_warp_invocation(Path::new("a"), None, Path::new("b"), &meta, &settings),
                Err(RegionRasterError::InvalidResolution(_))
            ));
        }
    }

    #[test]
    fn test_resampling_names() {
        assert_eq!(ResamplingMethod::Near.to_string(), "near");
        assert_eq!(ResamplingMethod::Average.to_string(), "average");
        assert_eq!(
            ResamplingMethod::from_str("bilinear", true).unwrap(),
            ResamplingMethod::Bilinear
        );
    }

    #[test]
    fn test_zero_area_template_rejected() {
        // zero pixel height collapses the extent to a line
        let meta = template([0.0, 10.0, 0.0, 50.0, 0.0, 0.0], None);
        let result = build_warp_invocation(
            Path::new("in.tif"),
            None,
            Path::new("out.tif"),
            &meta,
            &WarpSettings::new(10.0),
        );
        assert!(matches!(result, Err(RegionRasterError::InvalidExtent(_))));
    }
}
