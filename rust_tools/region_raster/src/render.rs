use crate::error::{RegionRasterError, Result};
use crate::reader::{nan_min_max, read_image, ReadOptions};
use crate::regions::RegionDescriptor;
use image::{Rgba, RgbaImage};
use log::{debug, info};
use ndarray::Array2;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Palette {
    Viridis,
    Reds,
    Greys,
    Spectral,
}

impl Palette {
    fn name(&self) -> &'static str {
        match self {
            Palette::Viridis => "viridis",
            Palette::Reds => "Reds",
            Palette::Greys => "Greys",
            Palette::Spectral => "Spectral",
        }
    }

    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            Palette::Viridis => &[
                [0x44, 0x01, 0x54],
                [0x3b, 0x52, 0x8b],
                [0x21, 0x91, 0x8c],
                [0x5e, 0xc9, 0x62],
                [0xfd, 0xe7, 0x25],
            ],
            Palette::Reds => &[
                [0xff, 0xf5, 0xf0],
                [0xfc, 0xbb, 0xa1],
                [0xfb, 0x6a, 0x4a],
                [0xcb, 0x18, 0x1d],
                [0x67, 0x00, 0x0d],
            ],
            Palette::Greys => &[
                [0xff, 0xff, 0xff],
                [0xbd, 0xbd, 0xbd],
                [0x73, 0x73, 0x73],
                [0x25, 0x25, 0x25],
                [0x00, 0x00, 0x00],
            ],
            Palette::Spectral => &[
                [0x9e, 0x01, 0x42],
                [0xf4, 0x6d, 0x43],
                [0xfe, 0xe0, 0x8b],
                [0xe6, 0xf5, 0x98],
                [0x66, 0xc2, 0xa5],
                [0x5e, 0x4f, 0xa2],
            ],
        }
    }
}

/// Linear colour gradient, optionally reversed (`Spectral_r`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMap {
    palette: Palette,
    reversed: bool,
}

impl ColorMap {
    pub fn reversed(self) -> Self {
        Self {
            reversed: !self.reversed,
            ..self
        }
    }

    /// Colour at `t` in `[0, 1]`; out-of-range positions clamp to the ends.
    pub fn color_at(&self, t: f64) -> [u8; 3] {
        let stops = self.palette.stops();
        let t = (if self.reversed { 1.0 - t } else { t }).clamp(0.0, 1.0);

        let pos = t * (stops.len() - 1) as f64;
        let lower = pos.floor() as usize;
        let upper = (lower + 1).min(stops.len() - 1);
        let frac = pos - lower as f64;

        let mut rgb = [0u8; 3];
        for (i, channel) in rgb.iter_mut().enumerate() {
            let a = stops[lower][i] as f64;
            let b = stops[upper][i] as f64;
            *channel = (a + (b - a) * frac).round() as u8;
        }
        rgb
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        Self {
            palette: Palette::Viridis,
            reversed: false,
        }
    }
}

impl FromStr for ColorMap {
    type Err = RegionRasterError;

    fn from_str(s: &str) -> Result<Self> {
        let (base, reversed) = match s.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (s, false),
        };
        let palette = match base.to_ascii_lowercase().as_str() {
            "viridis" => Palette::Viridis,
            "reds" => Palette::Reds,
            "greys" | "grays" => Palette::Greys,
            "spectral" => Palette::Spectral,
            _ => return Err(RegionRasterError::UnknownColorMap(s.to_string())),
        };
        Ok(Self { palette, reversed })
    }
}

impl fmt::Display for ColorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.palette.name())?;
        if self.reversed {
            write!(f, "_r")?;
        }
        Ok(())
    }
}

/// How one layer is coloured and placed on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStyle {
    pub layer_name: String,
    pub color_map: ColorMap,
    pub opacity: f32,
    /// Fixed colour limits; the array's own range when absent.
    pub clim: Option<(f32, f32)>,
    /// Attach a legend for this layer to the overlay manifest.
    pub legend: bool,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            layer_name: String::new(),
            color_map: ColorMap::default(),
            opacity: 1.0,
            clim: None,
            legend: true,
        }
    }
}

impl LayerStyle {
    pub fn value_range(&self, array: &Array2<f32>) -> (f32, f32) {
        self.clim.unwrap_or_else(|| nan_min_max(array))
    }
}

/// Colour limits must be finite with `min < max`.
pub fn validate_clim(clim: (f32, f32)) -> Result<(f32, f32)> {
    let (lo, hi) = clim;
    if lo.is_finite() && hi.is_finite() && lo < hi {
        Ok(clim)
    } else {
        Err(RegionRasterError::InvalidColorLimits(lo, hi))
    }
}

/// Colour `array` into an RGBA PNG; NaN pixels are fully transparent.
pub fn save_as_png(array: &Array2<f32>, path: &Path, style: &LayerStyle) -> Result<()> {
    if let Some(clim) = style.clim {
        validate_clim(clim)?;
    }
    let (lo, hi) = style.value_range(array);
    let (lo, hi) = (lo as f64, hi as f64);
    let span = hi - lo;
    let (rows, cols) = array.dim();

    let img = RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = array[[y as usize, x as usize]];
        if v.is_nan() {
            return Rgba([0, 0, 0, 0]);
        }
        let t = if span > 0.0 { (v as f64 - lo) / span } else { 0.0 };
        let [r, g, b] = style.color_map.color_at(t);
        Rgba([r, g, b, 255])
    });

    img.save(path)?;
    info!("Saved {} ({}x{}) to {}", style.layer_name, cols, rows, path.display());
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub min: f32,
    pub max: f32,
    pub color_map: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLayer {
    pub name: String,
    pub image: PathBuf,
    /// `[[south, west], [north, east]]`
    pub bounds: [[f64; 2]; 2],
    pub opacity: f32,
    pub legend: Option<Legend>,
}

impl OverlayLayer {
    pub fn new(image: PathBuf, bounds: [[f64; 2]; 2], style: &LayerStyle, range: (f32, f32)) -> Self {
        Self {
            name: style.layer_name.clone(),
            image,
            bounds,
            opacity: style.opacity,
            legend: style.legend.then(|| Legend {
                min: range.0,
                max: range.1,
                color_map: style.color_map.to_string(),
            }),
        }
    }
}

/// Everything a web map needs to show the exported PNGs over a region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayManifest {
    pub region: String,
    pub center: (f64, f64),
    pub zoom: u8,
    pub layers: Vec<OverlayLayer>,
}

impl OverlayManifest {
    pub fn new(name: &str, region: &RegionDescriptor) -> Self {
        Self {
            region: name.to_string(),
            center: region.center,
            zoom: region.zoom,
            layers: Vec::new(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        info!("Wrote overlay manifest: {}", path.display());
        Ok(())
    }
}

/// One dataset shown on the map: which raster to read and how to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Dataset label in the file name, e.g. `LST`.
    pub label: String,
    pub style: LayerStyle,
}

/// Parses `LABEL[:COLORMAP[:OPACITY[:NAME]]]`, e.g. `LST:Spectral_r:0.8:Land surface temperature`.
impl FromStr for LayerSpec {
    type Err = RegionRasterError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RegionRasterError::InvalidLayerSpec(s.to_string());
        let mut parts = s.splitn(4, ':');

        let label = parts.next().filter(|l| !l.is_empty()).ok_or_else(invalid)?;
        let mut style = LayerStyle {
            layer_name: label.to_string(),
            ..LayerStyle::default()
        };
        if let Some(cmap) = parts.next().filter(|c| !c.is_empty()) {
            style.color_map = cmap.parse()?;
        }
        if let Some(opacity) = parts.next().filter(|o| !o.is_empty()) {
            style.opacity = opacity
                .parse::<f32>()
                .ok()
                .filter(|o| (0.0..=1.0).contains(o))
                .ok_or_else(invalid)?;
        }
        if let Some(name) = parts.next().filter(|n| !n.is_empty()) {
            style.layer_name = name.to_string();
        }

        Ok(Self {
            label: label.to_string(),
            style,
        })
    }
}

/// `<out_dir>/<region>_overlay.json`
pub fn manifest_path(out_dir: &Path, region_name: &str) -> PathBuf {
    out_dir.join(format!("{}_overlay.json", region_name))
}

/// Read every layer of a region, export each as a PNG and write one manifest.
///
/// PNGs are `<out_dir>/<region>_<label>.png`. Without fixed colour limits a
/// layer is coloured, and its legend scaled, by the raster's own value range.
pub fn export_overlays(
    dir: &Path,
    region_name: &str,
    region: &RegionDescriptor,
    layers: &[LayerSpec],
    options: &ReadOptions,
    out_dir: &Path,
) -> Result<OverlayManifest> {
    fs::create_dir_all(out_dir)?;
    let mut manifest = OverlayManifest::new(region_name, region);

    for layer in layers {
        let image = read_image(dir, region, &layer.label, options)?;
        let range = match layer.style.clim {
            Some(clim) => validate_clim(clim)?,
            None => (image.min_value, image.max_value),
        };
        debug!("{}: colour range [{}, {}]", layer.label, range.0, range.1);

        // a constant or empty raster keeps no limits and paints the first colour
        let style = LayerStyle {
            clim: validate_clim(range).ok(),
            ..layer.style.clone()
        };
        let png = out_dir.join(format!("{}_{}.png", region_name, layer.label));
        save_as_png(&image.array, &png, &style)?;
        manifest
            .layers
            .push(OverlayLayer::new(png, image.bounds, &style, range));
    }

    manifest.write(&manifest_path(out_dir, region_name))?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_colormap_parsing() {
        let spectral_r: ColorMap = "Spectral_r".parse().unwrap();
        assert_eq!(spectral_r.to_string(), "Spectral_r");
        assert_eq!("reds".parse::<ColorMap>().unwrap().to_string(), "Reds");
        assert!("jet".parse::<ColorMap>().is_err());
    }

    #[test]
    fn test_colormap_ends_and_reverse() {
        let greys: ColorMap = "Greys".parse().unwrap();
        assert_eq!(greys.color_at(0.0), [255, 255, 255]);
        assert_eq!(greys.color_at(1.0), [0, 0, 0]);
        assert_eq!(greys.color_at(7.5), [0, 0, 0]);
        assert_eq!(greys.reversed().color_at(0.0), [0, 0, 0]);
    }

    #[test]
    fn test_png_alpha_from_nan() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("layer.png");
        let data = arr2(&[[0.0, f32::NAN], [5.0, 10.0]]);
        let style = LayerStyle {
            layer_name: "IMD".to_string(),
            color_map: "Greys".parse().unwrap(),
            ..LayerStyle::default()
        };

        save_as_png(&data, &path, &style).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 0)[3], 0);
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(1, 1), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_clim_overrides_range() {
        let style = LayerStyle {
            clim: Some((20.0, 40.0)),
            ..LayerStyle::default()
        };
        assert_eq!(style.value_range(&arr2(&[[0.0, 100.0]])), (20.0, 40.0));
    }

    #[test]
    fn test_reversed_clim_rejected() {
        assert!(validate_clim((20.0, 45.0)).is_ok());
        assert!(matches!(
            validate_clim((45.0, 20.0)),
            Err(RegionRasterError::InvalidColorLimits(45.0, 20.0))
        ));
        assert!(validate_clim((30.0, 30.0)).is_err());
        assert!(validate_clim((f32::NAN, 30.0)).is_err());

        let tmp = tempfile::tempdir().unwrap();
        let style = LayerStyle {
            clim: Some((45.0, 20.0)),
            ..LayerStyle::default()
        };
        let path = tmp.path().join("reversed.png");
        assert!(save_as_png(&arr2(&[[25.0]]), &path, &style).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_layer_spec_parsing() {
        let spec: LayerSpec = "LST:Spectral_r:0.8:Land surface temperature".parse().unwrap();
        assert_eq!(spec.label, "LST");
        assert_eq!(spec.style.layer_name, "Land surface temperature");
        assert_eq!(spec.style.color_map.to_string(), "Spectral_r");
        assert_eq!(spec.style.opacity, 0.8);

        let bare: LayerSpec = "IMD".parse().unwrap();
        assert_eq!(bare.style.layer_name, "IMD");
        assert_eq!(bare.style.color_map, ColorMap::default());
        assert_eq!(bare.style.opacity, 1.0);

        assert!(matches!(
            "".parse::<LayerSpec>(),
            Err(RegionRasterError::InvalidLayerSpec(_))
        ));
        assert!(matches!(
            "LST:viridis:2.0".parse::<LayerSpec>(),
            Err(RegionRasterError::InvalidLayerSpec(_))
        ));
        assert!(matches!(
            "LST:jet".parse::<LayerSpec>(),
            Err(RegionRasterError::UnknownColorMap(_))
        ));
    }

    #[test]
    fn test_manifest_json() {
        let region = RegionDescriptor {
            center: (48.2, 16.4),
            zoom: 11,
            image_label: "Wien".to_string(),
        };
        let mut manifest = OverlayManifest::new("Vienna", &region);
        let style = LayerStyle {
            layer_name: "LST".to_string(),
            ..LayerStyle::default()
        };
        manifest.layers.push(OverlayLayer::new(
            PathBuf::from("lst.png"),
            [[48.1, 16.2], [48.3, 16.6]],
            &style,
            (20.0, 40.0),
        ));

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["zoom"], 11);
        assert_eq!(json["layers"][0]["name"], "LST");
        assert_eq!(json["layers"][0]["legend"]["color_map"], "viridis");
        assert_eq!(json["layers"][0]["bounds"][1][0], 48.3);
    }
}
