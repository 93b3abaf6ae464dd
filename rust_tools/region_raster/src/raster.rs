use crate::error::{RegionRasterError, Result};
use gdal::raster::RasterBand;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use log::{debug, info};
use ndarray::Array2;
use std::path::Path;

/// Bounding box as stored by the raster: corners in the order GDAL reports them.
///
/// `left`/`right` and `bottom`/`top` are not guaranteed to be ordered; south-up
/// rasters have `bottom > top`. Use [`Extent::normalized`] before handing the box
/// to a warp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Extent {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Extent covered by a north-up (or south-up) geotransform of `width`x`height` pixels.
    pub fn from_geotransform(gt: &[f64; 6], width: usize, height: usize) -> Self {
        let left = gt[0];
        let top = gt[3];
        let right = left + gt[1] * width as f64;
        let bottom = top + gt[5] * height as f64;
        Self::new(left, bottom, right, top)
    }

    /// `(xmin, ymin, xmax, ymax)` regardless of axis orientation.
    pub fn normalized(&self) -> (f64, f64, f64, f64) {
        let ulx = self.left.min(self.right);
        let lrx = self.left.max(self.right);
        let uly = self.bottom.max(self.top);
        let lry = self.bottom.min(self.top);
        (ulx, lry, lrx, uly)
    }

    pub fn width(&self) -> f64 {
        (self.right - self.left).abs()
    }

    pub fn height(&self) -> f64 {
        (self.top - self.bottom).abs()
    }

    /// `[[south, west], [north, east]]`, the corner order web-map image overlays expect.
    pub fn overlay_bounds(&self) -> [[f64; 2]; 2] {
        let (west, south, east, north) = self.normalized();
        [[south, west], [north, east]]
    }
}

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl RasterMetadata {
    pub fn extent(&self) -> Extent {
        Extent::from_geotransform(&self.geotransform, self.width, self.height)
    }

    pub fn crs(&self) -> String {
        crs_string(&self.projection)
    }
}

/// Read band-1 metadata without loading pixels.
pub fn read_metadata(dataset: &Dataset) -> Result<RasterMetadata> {
    let rasterband: RasterBand = dataset.rasterband(1)?;

    let (width, height) = rasterband.size();

    if width == 0 || height == 0 {
        return Err(RegionRasterError::InvalidDimensions(width, height));
    }

    let nodata = rasterband.no_data_value();
    let geotransform = dataset.geo_transform()?;
    let pixel_width = geotransform[1].abs();
    let pixel_height = geotransform[5].abs();

    if pixel_width <= 0.0 {
        return Err(RegionRasterError::InvalidPixelSize(pixel_width));
    }

    debug!("Raster dimensions: {}x{}", width, height);
    debug!("Pixel size: {:.6} x {:.6}", pixel_width, pixel_height);

    Ok(RasterMetadata {
        width,
        height,
        geotransform,
        projection: dataset.projection(),
        nodata,
        pixel_width,
        pixel_height,
    })
}

pub fn open_metadata(path: &Path) -> Result<RasterMetadata> {
    let dataset = Dataset::open(path)?;
    read_metadata(&dataset)
}

/// Read band 1 as f32 with nodata pixels replaced by NaN.
pub fn read_band_f32(path: &Path) -> Result<(Array2<f32>, RasterMetadata)> {
    info!("Opening raster: {}", path.display());
    let dataset = Dataset::open(path)?;
    let metadata = read_metadata(&dataset)?;
    let rasterband = dataset.rasterband(1)?;

    let (width, height) = (metadata.width, metadata.height);
    let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
    let data_vec: Vec<f32> = buffer.into_iter().collect();
    let mut data = Array2::from_shape_vec((height, width), data_vec)?;

    if let Some(nd) = metadata.nodata {
        let nd = nd as f32;
        data.mapv_inplace(|v| if v == nd { f32::NAN } else { v });
    }

    Ok((data, metadata))
}

/// Write a single-band f32 GeoTIFF, NaN as nodata.
pub fn write_single_band(path: &Path, data: &Array2<f32>, metadata: &RasterMetadata) -> Result<()> {
    info!("Creating output raster: {}", path.display());

    let (height, width) = data.dim();
    if width != metadata.width || height != metadata.height {
        return Err(RegionRasterError::ShapeMismatch(
            (height, width),
            (metadata.height, metadata.width),
        ));
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f32, _>(path, width, height, 1)?;
    dataset.set_geo_transform(&metadata.geotransform)?;
    dataset.set_projection(&metadata.projection)?;

    let mut raster_band = dataset.rasterband(1)?;
    let values: Vec<f32> = data.iter().copied().collect();
    let mut buffer = gdal::raster::Buffer::new((width, height), values);
    raster_band.write((0, 0), (width, height), &mut buffer)?;
    raster_band.set_no_data_value(Some(f64::NAN))?;

    Ok(())
}

/// `AUTHORITY:CODE` (upper case) when the SRS carries one, the WKT otherwise.
pub fn crs_string(projection_wkt: &str) -> String {
    let spatial_ref = match SpatialRef::from_wkt(projection_wkt) {
        Ok(sr) => sr,
        Err(_) => return projection_wkt.to_string(),
    };

    match (spatial_ref.auth_name(), spatial_ref.auth_code()) {
        (Some(name), Ok(code)) => format!("{}:{}", name, code).to_uppercase(),
        _ => projection_wkt.to_string(),
    }
}
