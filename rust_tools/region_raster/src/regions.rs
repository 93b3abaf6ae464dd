use crate::error::{RegionRasterError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// How a named region is shown on a map and found on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Map centre as `[lat, lon]`.
    pub center: (f64, f64),
    pub zoom: u8,
    /// Substring identifying this region's raster files.
    pub image_label: String,
}

/// Read-only region lookup, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RegionTable {
    regions: BTreeMap<String, RegionDescriptor>,
}

impl RegionTable {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading region table: {}", path.display());
        let contents = fs::read_to_string(path)?;
        let table = Self::from_yaml_str(&contents)?;
        info!("Loaded {} regions", table.regions.len());
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Result<&RegionDescriptor> {
        self.regions
            .get(name)
            .ok_or_else(|| RegionRasterError::UnknownRegion(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.regions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl FromIterator<(String, RegionDescriptor)> for RegionTable {
    fn from_iter<I: IntoIterator<Item = (String, RegionDescriptor)>>(iter: I) -> Self {
        Self {
            regions: iter.into_iter().collect(),
        }
    }
}
