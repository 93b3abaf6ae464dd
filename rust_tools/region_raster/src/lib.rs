// Library exports for testing and reuse

pub mod align;
pub mod analysis;
pub mod cli;
pub mod clip;
pub mod error;
pub mod files;
pub mod raster;
pub mod rasterize;
pub mod reader;
pub mod regions;
pub mod render;
pub mod shape;
pub mod stats;
pub mod tool;

// Re-export commonly used types
pub use align::{reproject_by_template, ResamplingMethod, WarpSettings};
pub use clip::clip_to_region;
pub use error::{RegionRasterError, Result};
pub use files::list_filepaths;
pub use rasterize::rasterize_shapefile;
pub use reader::{read_image, RasterImage, ReadOptions};
pub use regions::{RegionDescriptor, RegionTable};
pub use render::{export_overlays, LayerSpec};
pub use shape::match_array_shape;
pub use stats::{calculate_statistics, calculate_statistics_masked};
