use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegionRasterError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Region table error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No file in {dir} matches patterns {patterns:?}")]
    NoMatchingFile { dir: PathBuf, patterns: Vec<String> },

    #[error("{count} files in {dir} match patterns {patterns:?}, expected exactly one")]
    AmbiguousMatch {
        dir: PathBuf,
        patterns: Vec<String>,
        count: usize,
    },

    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error("{0} not found on PATH")]
    ToolNotFound(String),

    #[error("{program} exited with code {code:?}: {stderr}")]
    ToolFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Expected output was not written: {0}")]
    OutputMissing(PathBuf),

    #[error("Invalid target resolution: {0} (must be positive)")]
    InvalidResolution(f64),

    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    #[error("Target resolution {res} yields an empty {width}x{height} raster")]
    InvalidRasterSize { res: f64, width: usize, height: usize },

    #[error("Raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Pixel size is non-positive: {0}")]
    InvalidPixelSize(f64),

    #[error("Vector source has no layers: {0}")]
    NoLayers(PathBuf),

    #[error("Invalid scaling factor: {0} (must be at least 1)")]
    InvalidScalingFactor(usize),

    #[error("Arrays have different shapes: {0:?} vs {1:?}")]
    ShapeMismatch((usize, usize), (usize, usize)),

    #[error("Invalid mask_by argument: {0}. Choose from \"LST\" or \"IMD\"")]
    InvalidMaskBy(String),

    #[error("Unknown colormap: {0}")]
    UnknownColorMap(String),

    #[error("Invalid colour limits: [{0}, {1}] (need finite min < max)")]
    InvalidColorLimits(f32, f32),

    #[error("Invalid layer spec: {0} (expected LABEL[:COLORMAP[:OPACITY[:NAME]]])")]
    InvalidLayerSpec(String),
}

pub type Result<T> = std::result::Result<T, RegionRasterError>;
