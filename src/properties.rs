//! Dataset manifest (`datasource-properties.json`) structures

use crate::error::{DatasetError, Result};
use crate::layout::BoundingBox;
use crate::types::{Category, DataFormat, Mag};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// File name of the manifest at the root of every dataset
pub const PROPERTIES_FILE_NAME: &str = "datasource-properties.json";

/// Dataset identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetId {
    pub name: String,
    #[serde(default)]
    pub team: String,
}

/// File naming of tiff datasets and layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiffOptions {
    pub pattern: String,
    pub tile_size: Option<[usize; 2]>,
}

/// One registered resolution of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionProperties {
    pub mag: Mag,
    /// Directory of this mag, relative to the layer directory
    pub path: String,
    /// Brick edge length of chunked mags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cube_length: Option<usize>,
}

/// Manifest entry of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerProperties {
    pub name: String,
    pub category: Category,
    /// Recorded extent in mag-1 voxel coordinates
    #[serde(default)]
    pub bounding_box: BoundingBox,
    /// Per-layer dtype, e.g. "uint24"
    pub element_class: String,
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
    #[serde(default)]
    pub data_format: DataFormat,
    #[serde(default)]
    pub wkw_resolutions: Vec<ResolutionProperties>,
    #[serde(flatten)]
    pub tiff: Option<TiffOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub largest_segment_id: Option<u64>,
}

fn default_num_channels() -> usize {
    1
}

impl LayerProperties {
    pub fn resolution(&self, mag: &Mag) -> Option<&ResolutionProperties> {
        self.wkw_resolutions.iter().find(|r| &r.mag == mag)
    }
}

/// Complete manifest of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetProperties {
    pub id: DatasetId,

    /// Physical voxel size
    pub scale: [f64; 3],

    #[serde(default)]
    pub data_format: DataFormat,

    /// Pattern and tile size of tiff datasets
    #[serde(flatten)]
    pub tiff: Option<TiffOptions>,

    #[serde(default)]
    pub data_layers: Vec<LayerProperties>,
}

impl DatasetProperties {
    /// Create an empty manifest
    pub fn new(
        name: impl Into<String>,
        scale: [f64; 3],
        data_format: DataFormat,
        tiff: Option<TiffOptions>,
    ) -> Self {
        Self {
            id: DatasetId {
                name: name.into(),
                team: String::new(),
            },
            scale,
            data_format,
            tiff,
            data_layers: Vec::new(),
        }
    }

    /// Path of the manifest inside a dataset directory
    pub fn file_path(dataset_path: &Path) -> PathBuf {
        dataset_path.join(PROPERTIES_FILE_NAME)
    }

    /// Read the manifest of the dataset at `dataset_path`
    pub async fn from_json(dataset_path: &Path) -> Result<Self> {
        let path = Self::file_path(dataset_path);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatasetError::DatasetNotFound(dataset_path.to_path_buf()));
            }
            Err(e) => return Err(DatasetError::filesystem("Reading manifest", path, e)),
        };
        let properties: DatasetProperties =
            serde_json::from_slice(&bytes).map_err(|e| DatasetError::ManifestParse {
                path: path.clone(),
                message: e.to_string(),
            })?;
        properties.validate().map_err(|message| DatasetError::ManifestParse {
            path,
            message,
        })?;
        Ok(properties)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(format!("scale {:?} must be positive", self.scale));
        }
        for (i, layer) in self.data_layers.iter().enumerate() {
            if self.data_layers[..i].iter().any(|l| l.name == layer.name) {
                return Err(format!("layer '{}' is listed twice", layer.name));
            }
            if layer.num_channels == 0 {
                return Err(format!("layer '{}' has zero channels", layer.name));
            }
        }
        Ok(())
    }

    /// Rewrite the full manifest
    ///
    /// The document is written next to the manifest and renamed over it.
    pub async fn export_as_json(&self, dataset_path: &Path) -> Result<()> {
        let path = Self::file_path(dataset_path);
        let staging = dataset_path.join(format!(".{}.tmp", PROPERTIES_FILE_NAME));
        let json = serde_json::to_vec_pretty(self)?;

        fs::write(&staging, &json)
            .await
            .map_err(|e| DatasetError::filesystem("Writing manifest", &staging, e))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| DatasetError::filesystem("Replacing manifest", &path, e))?;
        Ok(())
    }

    pub fn layer(&self, name: &str) -> Option<&LayerProperties> {
        self.data_layers.iter().find(|l| l.name == name)
    }

    pub fn contains_layer(&self, name: &str) -> bool {
        self.layer(name).is_some()
    }

    /// Next manifest with `layer` appended
    pub fn with_layer(&self, layer: LayerProperties) -> Result<Self> {
        if self.contains_layer(&layer.name) {
            return Err(DatasetError::DuplicateLayer(layer.name));
        }
        let mut next = self.clone();
        next.data_layers.push(layer);
        Ok(next)
    }

    /// Next manifest without the layer `name`
    pub fn without_layer(&self, name: &str) -> Result<Self> {
        if !self.contains_layer(name) {
            return Err(DatasetError::UnknownLayer(name.to_string()));
        }
        let mut next = self.clone();
        next.data_layers.retain(|l| l.name != name);
        Ok(next)
    }

    /// Next manifest with the layer `name` modified by `update`
    pub fn with_updated_layer<F>(&self, name: &str, update: F) -> Result<Self>
    where
        F: FnOnce(&mut LayerProperties) -> Result<()>,
    {
        let mut next = self.clone();
        let layer = next
            .data_layers
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| DatasetError::UnknownLayer(name.to_string()))?;
        update(layer)?;
        Ok(next)
    }
}
