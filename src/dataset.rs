//! Datasets - a directory with a manifest and a registry of layers
//!
//! Every mutating call builds the next [`DatasetProperties`] value, persists
//! it and only then swaps it in together with the layer registry, so the
//! manifest on disk and the in-memory layers never disagree once a call
//! returns.

use crate::block::VoxelBlock;
use crate::error::{DatasetError, Result};
use crate::import::{remove_layer_dir, LayerImporter, SymlinkImporter};
use crate::layer::{Layer, MagDataset};
use crate::layout::{BoundingBox, BrickSize};
use crate::options::{FormatOptions, LayerSpec};
use crate::properties::{DatasetProperties, LayerProperties, ResolutionProperties};
use crate::storage::{FileSystemEngine, StorageEngine};
use crate::types::{DataFormat, Mag};
use crate::utils::dataset_name_from_path;
use crate::view::View;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// A dataset opened from, or created at, a directory
pub struct Dataset {
    path: PathBuf,
    properties: DatasetProperties,
    layers: HashMap<String, Layer>,
    engine: Arc<dyn StorageEngine>,
}

impl Dataset {
    /// Open the dataset at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_engine(path, Arc::new(FileSystemEngine)).await
    }

    /// Open the dataset at `path`, keeping its voxel data in `engine`
    pub async fn open_with_engine(
        path: impl AsRef<Path>,
        engine: Arc<dyn StorageEngine>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let properties = DatasetProperties::from_json(&path).await?;

        let opened = try_join_all(
            properties
                .data_layers
                .iter()
                .map(|layer_properties| Layer::open(&path, layer_properties, engine.as_ref())),
        )
        .await?;
        let layers: HashMap<String, Layer> = opened
            .into_iter()
            .map(|layer| (layer.name().to_string(), layer))
            .collect();
        debug!(
            "Opened dataset '{}' at {} with {} layer(s)",
            properties.id.name,
            path.display(),
            layers.len()
        );

        Ok(Self {
            path,
            properties,
            layers,
            engine,
        })
    }

    /// Create an empty dataset at `path`
    ///
    /// `path` must not exist yet or be an empty directory.
    pub async fn create(
        path: impl AsRef<Path>,
        scale: [f64; 3],
        format: FormatOptions,
    ) -> Result<Self> {
        Self::create_with_engine(path, scale, format, Arc::new(FileSystemEngine)).await
    }

    pub async fn create_with_engine(
        path: impl AsRef<Path>,
        scale: [f64; 3],
        format: FormatOptions,
        engine: Arc<dyn StorageEngine>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(DatasetError::InvalidScale(format!(
                "{:?} must be three positive numbers",
                scale
            )));
        }
        let tiff = format.tiff_options()?;
        ensure_empty_target(&path).await?;

        let name = dataset_name_from_path(&path);
        let properties = DatasetProperties::new(name, scale, format.data_format(), tiff);

        fs::create_dir_all(&path)
            .await
            .map_err(|e| DatasetError::filesystem("Creating dataset", &path, e))?;
        properties.export_as_json(&path).await?;
        info!(
            "Created {} dataset '{}' at {}",
            properties.data_format,
            properties.id.name,
            path.display()
        );

        Ok(Self {
            path,
            properties,
            layers: HashMap::new(),
            engine,
        })
    }

    /// Open the dataset at `path` if it has a manifest, otherwise create it
    ///
    /// An existing dataset must match `scale` and `format`.
    pub async fn get_or_create(
        path: impl AsRef<Path>,
        scale: [f64; 3],
        format: FormatOptions,
    ) -> Result<Self> {
        Self::get_or_create_with_engine(path, scale, format, Arc::new(FileSystemEngine)).await
    }

    pub async fn get_or_create_with_engine(
        path: impl AsRef<Path>,
        scale: [f64; 3],
        format: FormatOptions,
        engine: Arc<dyn StorageEngine>,
    ) -> Result<Self> {
        let path = path.as_ref();
        if fs::metadata(DatasetProperties::file_path(path)).await.is_err() {
            return Self::create_with_engine(path, scale, format, engine).await;
        }

        let dataset = Self::open_with_engine(path, engine).await?;
        if dataset.properties.scale != scale {
            return Err(DatasetError::ConfigMismatch(format!(
                "the dataset {} already exists, but the scales do not match ({:?} != {:?})",
                path.display(),
                dataset.properties.scale,
                scale
            )));
        }
        format.check_matches(&dataset.properties)?;
        Ok(dataset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.properties.id.name
    }

    pub fn scale(&self) -> [f64; 3] {
        self.properties.scale
    }

    pub fn data_format(&self) -> DataFormat {
        self.properties.data_format
    }

    pub fn properties(&self) -> &DatasetProperties {
        &self.properties
    }

    pub fn layers(&self) -> &HashMap<String, Layer> {
        &self.layers
    }

    pub fn get_layer(&self, name: &str) -> Result<&Layer> {
        self.layers
            .get(name)
            .ok_or_else(|| DatasetError::UnknownLayer(name.to_string()))
    }

    fn layer_properties(&self, name: &str) -> Result<&LayerProperties> {
        self.properties
            .layer(name)
            .ok_or_else(|| DatasetError::UnknownLayer(name.to_string()))
    }

    /// Persist `next` and make it the current manifest
    async fn commit(&mut self, next: DatasetProperties) -> Result<()> {
        next.export_as_json(&self.path).await?;
        self.properties = next;
        Ok(())
    }

    /// Add an empty layer
    pub async fn add_layer(&mut self, spec: LayerSpec) -> Result<&Layer> {
        let num_channels = spec.num_channels.unwrap_or(1);
        let (dtype_per_channel, dtype_per_layer) = spec.resolve_dtypes(num_channels)?;
        if self.layers.contains_key(&spec.name) {
            return Err(DatasetError::DuplicateLayer(spec.name));
        }

        let layer_properties = LayerProperties {
            name: spec.name.clone(),
            category: spec.category,
            bounding_box: BoundingBox::default(),
            element_class: dtype_per_layer,
            num_channels,
            data_format: self.properties.data_format,
            wkw_resolutions: Vec::new(),
            tiff: self.properties.tiff.clone(),
            largest_segment_id: spec.largest_segment_id,
        };
        let next = self.properties.with_layer(layer_properties.clone())?;
        let layer = Layer::empty(&self.path, &layer_properties)?;

        let layer_path = layer.path().to_path_buf();
        fs::create_dir_all(&layer_path)
            .await
            .map_err(|e| DatasetError::filesystem("Creating layer", &layer_path, e))?;
        self.commit(next).await?;

        info!(
            "Added {} layer '{}' ({} x {}) to {}",
            layer.category(),
            layer.name(),
            num_channels,
            dtype_per_channel,
            self.path.display()
        );
        let name = spec.name;
        self.layers.insert(name.clone(), layer);
        self.get_layer(&name)
    }

    /// The layer `spec.name`, added if missing
    ///
    /// An existing layer must match the category and every dtype or channel
    /// count given in `spec`.
    pub async fn get_or_add_layer(&mut self, spec: LayerSpec) -> Result<&Layer> {
        let Some(existing) = self.layers.get(&spec.name) else {
            return self.add_layer(spec).await;
        };

        if existing.category() != spec.category {
            return Err(DatasetError::ConfigMismatch(format!(
                "the layer '{}' already exists, but the categories do not match ({} != {})",
                spec.name,
                existing.category(),
                spec.category
            )));
        }
        if let Some(num_channels) = spec.num_channels {
            if num_channels != existing.num_channels() {
                return Err(DatasetError::ConfigMismatch(format!(
                    "the layer '{}' already exists, but the number of channels do not match ({} != {})",
                    spec.name,
                    existing.num_channels(),
                    num_channels
                )));
            }
        }
        if spec.has_dtype() {
            let num_channels = spec.num_channels.unwrap_or(existing.num_channels());
            let (dtype_per_channel, _) = spec.resolve_dtypes(num_channels)?;
            if dtype_per_channel != existing.dtype_per_channel() {
                return Err(DatasetError::ConfigMismatch(format!(
                    "the layer '{}' already exists, but the dtypes do not match ({} != {})",
                    spec.name,
                    existing.dtype_per_channel(),
                    dtype_per_channel
                )));
            }
        }
        self.get_layer(&spec.name)
    }

    /// Delete a layer and its directory
    ///
    /// Files go first; the manifest is only updated once they are gone. A
    /// linked layer loses its link, the linked data stays untouched.
    pub async fn delete_layer(&mut self, name: &str) -> Result<()> {
        if !self.layers.contains_key(name) {
            return Err(DatasetError::UnknownLayer(name.to_string()));
        }
        let next = self.properties.without_layer(name)?;

        remove_layer_dir(&self.path.join(name)).await?;
        self.commit(next).await?;
        self.layers.remove(name);
        info!("Deleted layer '{}' from {}", name, self.path.display());
        Ok(())
    }

    /// Link the layer directory of another dataset into this one
    pub async fn add_symlink_layer(&mut self, foreign_layer_path: impl AsRef<Path>) -> Result<&Layer> {
        self.import_layer(foreign_layer_path, &SymlinkImporter).await
    }

    /// Import the layer directory of another dataset through `importer`
    ///
    /// The layer keeps the directory name, and its manifest entry is copied
    /// from the foreign dataset unchanged.
    pub async fn import_layer(
        &mut self,
        foreign_layer_path: impl AsRef<Path>,
        importer: &dyn LayerImporter,
    ) -> Result<&Layer> {
        let foreign_layer_path = foreign_layer_path.as_ref();
        // links in the path stay unresolved, so a linked layer is imported
        // with the manifest entry of the dataset it was named through
        let source = std::path::absolute(foreign_layer_path)
            .map_err(|e| DatasetError::filesystem("Resolving layer", foreign_layer_path, e))?;
        fs::metadata(&source)
            .await
            .map_err(|e| DatasetError::filesystem("Resolving layer", &source, e))?;
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| DatasetError::UnknownLayer(source.display().to_string()))?;
        if self.layers.contains_key(&name) {
            return Err(DatasetError::DuplicateLayer(name));
        }

        let foreign_dataset = source.parent().unwrap_or(source.as_path());
        let layer_properties = DatasetProperties::from_json(foreign_dataset)
            .await?
            .layer(&name)
            .cloned()
            .ok_or_else(|| DatasetError::UnknownLayer(name.clone()))?;
        let next = self.properties.with_layer(layer_properties.clone())?;

        let target = self.path.join(&name);
        if fs::symlink_metadata(&target).await.is_ok() {
            return Err(DatasetError::filesystem(
                "Importing layer",
                &target,
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        let imported = match importer.import(&source, &target).await {
            Ok(()) => match Layer::open(&self.path, &layer_properties, self.engine.as_ref()).await {
                Ok(layer) => self.commit(next).await.map(|_| layer),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        let layer = match imported {
            Ok(layer) => layer,
            Err(e) => {
                if let Err(cleanup) = remove_layer_dir(&target).await {
                    warn!("Could not remove {}: {}", target.display(), cleanup);
                }
                return Err(e);
            }
        };

        info!(
            "Imported layer '{}' from {} with {} mag(s)",
            name,
            source.display(),
            layer.mags().len()
        );
        self.layers.insert(name.clone(), layer);
        self.get_layer(&name)
    }

    /// Register a new resolution of a layer
    pub async fn add_mag(&mut self, layer_name: &str, mag: Mag) -> Result<&MagDataset> {
        let layer = self.get_layer(layer_name)?;
        if layer.mags().contains_key(&mag) {
            return Err(DatasetError::DuplicateMag {
                layer: layer_name.to_string(),
                mag: mag.to_layer_name(),
            });
        }
        let resolution = ResolutionProperties {
            mag,
            path: mag.to_layer_name(),
            cube_length: match layer.data_format() {
                DataFormat::Wkw => Some(BrickSize::default().edge()),
                DataFormat::Tiff | DataFormat::TiledTiff => None,
            },
        };

        let next = self.properties.with_updated_layer(layer_name, |layer| {
            layer.wkw_resolutions.push(resolution.clone());
            Ok(())
        })?;
        let layer_properties = next
            .layer(layer_name)
            .ok_or_else(|| DatasetError::UnknownLayer(layer_name.to_string()))?;
        let mag_dataset =
            MagDataset::open(&self.path, layer_properties, &resolution, self.engine.as_ref())
                .await?;
        self.commit(next).await?;

        debug!("Added mag {} to layer '{}'", mag, layer_name);
        let layer = self
            .layers
            .get_mut(layer_name)
            .ok_or_else(|| DatasetError::UnknownLayer(layer_name.to_string()))?;
        layer.insert_mag(mag_dataset);
        layer.get_mag(&mag)
    }

    /// The resolution `mag` of a layer, registered if missing
    pub async fn get_or_add_mag(&mut self, layer_name: &str, mag: Mag) -> Result<&MagDataset> {
        if self.get_layer(layer_name)?.mags().contains_key(&mag) {
            return self.get_layer(layer_name)?.get_mag(&mag);
        }
        self.add_mag(layer_name, mag).await
    }

    /// View of `size` voxels at `offset` of one resolution of a layer
    pub fn get_view(
        &self,
        layer_name: &str,
        mag: Mag,
        size: [usize; 3],
        offset: Option<[usize; 3]>,
        is_bounded: bool,
    ) -> Result<View> {
        let mag_dataset = self.get_layer(layer_name)?.get_mag(&mag)?;
        Ok(mag_dataset.get_view(size, offset, is_bounded))
    }

    /// Write `block` at `offset` (in `mag` voxels) and grow the recorded extent
    pub async fn write_data(
        &mut self,
        layer_name: &str,
        mag: Mag,
        offset: [usize; 3],
        block: &VoxelBlock,
    ) -> Result<()> {
        let storage = self.get_layer(layer_name)?.get_mag(&mag)?.storage();
        storage.write(offset, block).await?;

        let written = BoundingBox::new(offset, block.size()).to_mag1(&mag);
        let recorded = self.layer_properties(layer_name)?.bounding_box;
        let grown = recorded.union(&written);
        if grown != recorded {
            let next = self.properties.with_updated_layer(layer_name, |layer| {
                layer.bounding_box = grown;
                Ok(())
            })?;
            self.commit(next).await?;
            debug!("Layer '{}' now spans {}", layer_name, grown);
        }
        Ok(())
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("name", &self.properties.id.name)
            .field("data_format", &self.properties.data_format)
            .field("layers", &self.layers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `path` must be missing or an empty directory
async fn ensure_empty_target(path: &Path) -> Result<()> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DatasetError::filesystem("Creating dataset", path, e)),
    };
    if !metadata.is_dir() {
        return Err(DatasetError::NotADirectory(path.to_path_buf()));
    }
    let mut entries = fs::read_dir(path)
        .await
        .map_err(|e| DatasetError::filesystem("Creating dataset", path, e))?;
    let first = entries
        .next_entry()
        .await
        .map_err(|e| DatasetError::filesystem("Creating dataset", path, e))?;
    if first.is_some() {
        return Err(DatasetError::NonEmptyDirectory(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryEngine;
    use crate::types::{Category, DataType, VoxelType};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_rejects_occupied_paths() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            Dataset::create(&file, [1.0; 3], FormatOptions::Wkw).await,
            Err(DatasetError::NotADirectory(_))
        ));

        let occupied = temp_dir.path().join("occupied");
        std::fs::create_dir_all(occupied.join("something")).unwrap();
        assert!(matches!(
            Dataset::create(&occupied, [1.0; 3], FormatOptions::Wkw).await,
            Err(DatasetError::NonEmptyDirectory(_))
        ));

        let empty = temp_dir.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let dataset = Dataset::create(&empty, [1.0; 3], FormatOptions::Wkw).await.unwrap();
        assert_eq!(dataset.name(), "empty");
    }

    #[tokio::test]
    async fn test_create_validates_scale_and_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ds");
        assert!(matches!(
            Dataset::create(&path, [1.0, 0.0, 1.0], FormatOptions::Wkw).await,
            Err(DatasetError::InvalidScale(_))
        ));
        let format = FormatOptions::Tiff {
            pattern: Some("{zzz".to_string()),
        };
        assert!(matches!(
            Dataset::create(&path, [1.0; 3], format).await,
            Err(DatasetError::InvalidPattern { .. })
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_add_layer_failure_leaves_state_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
            .await
            .unwrap();
        dataset
            .add_layer(LayerSpec::color("color").with_num_channels(3))
            .await
            .unwrap();
        let before = dataset.properties().clone();

        assert!(matches!(
            dataset.add_layer(LayerSpec::segmentation("color")).await,
            Err(DatasetError::DuplicateLayer(_))
        ));
        assert!(matches!(
            dataset
                .add_layer(
                    LayerSpec::color("both")
                        .with_dtype_per_layer("uint8")
                        .with_dtype_per_channel("uint8")
                )
                .await,
            Err(DatasetError::AmbiguousDtype)
        ));
        assert_eq!(dataset.properties(), &before);
        assert_eq!(
            DatasetProperties::from_json(dataset.path()).await.unwrap(),
            before
        );
        assert_eq!(dataset.layers().len(), 1);
    }

    #[tokio::test]
    async fn test_mags_and_recorded_extent() {
        let temp_dir = TempDir::new().unwrap();
        let mut dataset = Dataset::create_with_engine(
            temp_dir.path().join("ds"),
            [1.0; 3],
            FormatOptions::Wkw,
            Arc::new(MemoryEngine::new()),
        )
        .await
        .unwrap();
        dataset
            .add_layer(LayerSpec::color("color").with_dtype_per_channel("uint16"))
            .await
            .unwrap();

        let mag2: Mag = "2".parse().unwrap();
        dataset.add_mag("color", Mag::ONE).await.unwrap();
        dataset.add_mag("color", mag2).await.unwrap();
        assert!(matches!(
            dataset.add_mag("color", mag2).await,
            Err(DatasetError::DuplicateMag { .. })
        ));
        assert_eq!(dataset.get_or_add_mag("color", mag2).await.unwrap().mag(), mag2);
        assert!(matches!(
            dataset.add_mag("missing", Mag::ONE).await,
            Err(DatasetError::UnknownLayer(_))
        ));

        let voxel_type = VoxelType::new(DataType::U16, 1);
        let block = VoxelBlock::from_bytes([2, 1, 1], voxel_type, vec![1, 0, 2, 0]).unwrap();
        dataset.write_data("color", mag2, [3, 4, 5], &block).await.unwrap();

        let recorded = dataset.properties().layer("color").unwrap().bounding_box;
        assert_eq!(recorded, BoundingBox::new([6, 8, 10], [4, 2, 2]));
        let on_disk = DatasetProperties::from_json(dataset.path()).await.unwrap();
        assert_eq!(on_disk.layer("color").unwrap().bounding_box, recorded);
        assert_eq!(on_disk.layer("color").unwrap().wkw_resolutions.len(), 2);

        let view = dataset
            .get_view("color", mag2, [2, 1, 1], Some([3, 4, 5]), true)
            .unwrap();
        assert_eq!(view.read_all().await.unwrap(), block);
        assert!(matches!(
            dataset.get_view("color", "4".parse().unwrap(), [1; 3], None, true),
            Err(DatasetError::UnknownMag { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_or_add_layer_checks() {
        let temp_dir = TempDir::new().unwrap();
        let mut dataset = Dataset::create(temp_dir.path().join("ds"), [1.0; 3], FormatOptions::Wkw)
            .await
            .unwrap();
        dataset
            .add_layer(LayerSpec::color("color").with_dtype_per_layer("uint24").with_num_channels(3))
            .await
            .unwrap();

        // dtype given alone is converted with the existing channel count
        let layer = dataset
            .get_or_add_layer(LayerSpec::color("color").with_dtype_per_layer("uint24"))
            .await
            .unwrap();
        assert_eq!(layer.category(), Category::Color);

        assert!(matches!(
            dataset
                .get_or_add_layer(LayerSpec::color("color").with_num_channels(1))
                .await,
            Err(DatasetError::ConfigMismatch(_))
        ));
        assert!(matches!(
            dataset
                .get_or_add_layer(LayerSpec::color("color").with_dtype_per_channel("uint16"))
                .await,
            Err(DatasetError::ConfigMismatch(_))
        ));
    }
}
