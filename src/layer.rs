//! Layers and their registered mags

use crate::dtype::{dtype_per_channel_to_dtype_per_layer, dtype_per_layer_to_dtype_per_channel};
use crate::error::{DatasetError, Result};
use crate::properties::{LayerProperties, ResolutionProperties};
use crate::storage::{MagStorage, StorageEngine, StorageSpec};
use crate::types::{Category, DataFormat, DataType, Mag, VoxelType};
use crate::view::View;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One opened resolution of a layer
#[derive(Clone)]
pub struct MagDataset {
    mag: Mag,
    path: PathBuf,
    storage: Arc<dyn MagStorage>,
}

impl MagDataset {
    pub(crate) async fn open(
        dataset_path: &Path,
        layer: &LayerProperties,
        resolution: &ResolutionProperties,
        engine: &dyn StorageEngine,
    ) -> Result<Self> {
        let spec = StorageSpec::for_resolution(dataset_path, layer, resolution, false)?;
        let storage = engine.open(&spec).await?;
        Ok(Self {
            mag: resolution.mag,
            path: spec.path,
            storage,
        })
    }

    pub fn mag(&self) -> Mag {
        self.mag
    }

    /// Directory holding the data of this mag
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn voxel_type(&self) -> VoxelType {
        self.storage.voxel_type()
    }

    pub fn storage(&self) -> Arc<dyn MagStorage> {
        Arc::clone(&self.storage)
    }

    /// View of `size` voxels at `offset` (the origin when `None`)
    pub fn get_view(&self, size: [usize; 3], offset: Option<[usize; 3]>, is_bounded: bool) -> View {
        View::new(
            self.storage(),
            offset.unwrap_or([0, 0, 0]),
            size,
            is_bounded,
        )
    }
}

impl std::fmt::Debug for MagDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MagDataset")
            .field("mag", &self.mag)
            .field("path", &self.path)
            .finish()
    }
}

/// A named channel stack of a dataset, owned by its [`Dataset`](crate::Dataset)
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    category: Category,
    dtype_per_channel: DataType,
    num_channels: usize,
    data_format: DataFormat,
    path: PathBuf,
    mags: BTreeMap<Mag, MagDataset>,
}

impl Layer {
    /// Rebuild a layer from its manifest entry, opening every registered mag
    pub(crate) async fn open(
        dataset_path: &Path,
        properties: &LayerProperties,
        engine: &dyn StorageEngine,
    ) -> Result<Self> {
        let mut layer = Self::empty(dataset_path, properties)?;
        for resolution in &properties.wkw_resolutions {
            let mag = MagDataset::open(dataset_path, properties, resolution, engine).await?;
            layer.mags.insert(resolution.mag, mag);
        }
        Ok(layer)
    }

    /// A layer without any opened mag
    pub(crate) fn empty(dataset_path: &Path, properties: &LayerProperties) -> Result<Self> {
        Ok(Self {
            name: properties.name.clone(),
            category: properties.category,
            dtype_per_channel: dtype_per_layer_to_dtype_per_channel(
                &properties.element_class,
                properties.num_channels,
            )?,
            num_channels: properties.num_channels,
            data_format: properties.data_format,
            path: dataset_path.join(&properties.name),
            mags: BTreeMap::new(),
        })
    }

    pub(crate) fn insert_mag(&mut self, mag: MagDataset) {
        self.mags.insert(mag.mag(), mag);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn dtype_per_channel(&self) -> DataType {
        self.dtype_per_channel
    }

    pub fn dtype_per_layer(&self) -> Result<String> {
        dtype_per_channel_to_dtype_per_layer(self.dtype_per_channel, self.num_channels)
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn voxel_type(&self) -> VoxelType {
        VoxelType::new(self.dtype_per_channel, self.num_channels)
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mags(&self) -> &BTreeMap<Mag, MagDataset> {
        &self.mags
    }

    pub fn get_mag(&self, mag: &Mag) -> Result<&MagDataset> {
        self.mags.get(mag).ok_or_else(|| DatasetError::UnknownMag {
            layer: self.name.clone(),
            mag: mag.to_layer_name(),
        })
    }
}
