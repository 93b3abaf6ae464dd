use crate::align::ResamplingMethod;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "region-raster")]
#[command(about = "Align, clip, and summarise regional rasters with GDAL")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reproject and resample a raster onto a template's grid
    Reproject {
        /// Raster to reproject
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Raster whose CRS and extent define the output grid
        #[arg(short = 'T', long, value_name = "FILE")]
        template: PathBuf,

        /// Output GeoTIFF path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Output pixel size in template CRS units
        #[arg(short, long, value_name = "RES")]
        resolution: f64,

        #[arg(long, value_enum, default_value_t = ResamplingMethod::Near)]
        resampling: ResamplingMethod,

        /// Pass the input's nodata value to gdalwarp as -srcnodata
        #[arg(long)]
        use_src_nodata: bool,

        /// Nodata value for the output
        #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
        dst_nodata: Option<f64>,

        /// Extra gdalwarp arguments, as one string
        #[arg(long, value_name = "ARGS", default_value = "", allow_hyphen_values = true)]
        extra: String,

        #[command(flatten)]
        output_mode: ToolOutputArgs,
    },

    /// Burn a vector boundary into a 0/1 byte raster
    Rasterize {
        /// Vector boundary file (e.g. shapefile)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[arg(short, long, value_name = "RES")]
        resolution: f64,

        #[command(flatten)]
        output_mode: ToolOutputArgs,
    },

    /// Rasterize every shapefile in a directory and align each to a template
    RasterizeRegions {
        #[arg(long, value_name = "DIR")]
        shapefiles: PathBuf,

        #[arg(short = 'T', long, value_name = "FILE")]
        template: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,

        #[arg(short, long, value_name = "RES")]
        resolution: f64,

        #[command(flatten)]
        output_mode: ToolOutputArgs,
    },

    /// Crop a raster to a cutline, reprojecting to a target CRS
    Clip {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Cutline vector file; its file stem is used as the layer name
        #[arg(short, long, value_name = "FILE")]
        cutline: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[arg(long, value_name = "CRS", default_value = "EPSG:4326")]
        target_crs: String,

        #[command(flatten)]
        output_mode: ToolOutputArgs,
    },

    /// Clip a raster to every shapefile in a directory
    ClipRegions {
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "DIR")]
        shapefiles: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,

        #[arg(long, value_name = "CRS", default_value = "EPSG:4326")]
        target_crs: String,

        #[command(flatten)]
        output_mode: ToolOutputArgs,
    },

    /// Summary statistics of one region's raster
    Stats {
        #[command(flatten)]
        region: RegionArgs,

        /// Dataset label in the file name (e.g. LST, IMD)
        #[arg(short, long, value_name = "LABEL")]
        label: String,

        /// Values left out of the statistics
        #[arg(long, value_name = "VALUE", value_delimiter = ',', allow_hyphen_values = true)]
        exclude: Vec<f32>,

        /// Also print a histogram with this many bins
        #[arg(long, value_name = "N")]
        bins: Option<usize>,
    },

    /// Mask a region by LST or IMD, export PNG overlays, print statistics
    Analyze {
        #[command(flatten)]
        region: RegionArgs,

        /// Layer that defines the mask: LST or IMD
        #[arg(long, value_name = "LAYER", default_value = "LST")]
        mask_by: String,

        /// Pixels below this value are masked out
        #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
        mask_below: f32,

        /// Colour limits of the LST layer
        #[arg(long, value_names = ["MIN", "MAX"], num_args = 2, default_values_t = [20.0, 45.0])]
        clim: Vec<f32>,

        #[command(flatten)]
        layers: LayerArgs,

        /// Directory for PNGs and the overlay manifest
        #[arg(short, long, value_name = "DIR", default_value = "overlays")]
        output_dir: PathBuf,
    },

    /// Export PNG overlays of several layers plus a manifest for a web map
    Overlay {
        #[command(flatten)]
        region: RegionArgs,

        /// Layer as LABEL[:COLORMAP[:OPACITY[:NAME]]]; repeat for more layers
        #[arg(short = 'L', long = "layer", value_name = "SPEC", required = true)]
        layers: Vec<String>,

        /// Directory for PNGs and the overlay manifest
        #[arg(short, long, value_name = "DIR", default_value = "overlays")]
        output_dir: PathBuf,
    },

    /// Mean LST per IMD class, written as CSV
    CategoryMeans {
        #[command(flatten)]
        region: RegionArgs,

        #[command(flatten)]
        layers: LayerArgs,

        /// Keep outlier means (default drops those outside 1.5 IQR)
        #[arg(long)]
        keep_outliers: bool,

        /// IMD classes left out of the output
        #[arg(long, value_name = "VALUE", value_delimiter = ',', default_values_t = [0.0, 100.0])]
        exclude: Vec<f32>,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
pub struct ToolOutputArgs {
    /// Show the GDAL tool's own output instead of capturing it
    #[arg(long)]
    pub show_tool_output: bool,
}

#[derive(ClapArgs, Debug)]
pub struct RegionArgs {
    /// Directory holding the region rasters
    #[arg(short, long, value_name = "DIR")]
    pub rasters_dir: PathBuf,

    /// YAML table of regions
    #[arg(long, value_name = "FILE", default_value = "regions.yaml")]
    pub regions: PathBuf,

    /// Region name from the table
    #[arg(short = 'R', long, value_name = "NAME")]
    pub region: String,

    /// Projection code that must appear in the file name
    #[arg(long, value_name = "CODE", default_value = "4326")]
    pub projection: String,
}

#[derive(ClapArgs, Debug)]
pub struct LayerArgs {
    #[arg(long, value_name = "LABEL", default_value = "IMD")]
    pub imd_label: String,

    #[arg(long, value_name = "LABEL", default_value = "LST")]
    pub lst_label: String,

    #[arg(long, value_name = "NAME", default_value = "Imperviousness")]
    pub imd_layer_name: String,

    #[arg(long, value_name = "NAME", default_value = "Land surface temperature")]
    pub lst_layer_name: String,

    /// Ratio of the LST pixel size to the IMD pixel size
    #[arg(long, value_name = "N", default_value_t = 7)]
    pub scaling_factor: usize,
}
