//! Storage engines for the voxel data of one mag
//!
//! The dataset model only needs an open/read/write contract from the engine:
//! [`StorageEngine::open`] hands out a [`MagStorage`] handle for a mag directory,
//! which reads and writes [`VoxelBlock`]s at voxel offsets.

mod brick;
mod memory;
mod tiff;

pub use brick::BrickStorage;
pub use memory::MemoryEngine;
pub use tiff::TiffStorage;

use crate::block::VoxelBlock;
use crate::dtype::dtype_per_layer_to_dtype_per_channel;
use crate::error::{DatasetError, Result};
use crate::layout::{BoundingBox, BrickSize};
use crate::properties::{LayerProperties, ResolutionProperties, TiffOptions};
use crate::types::{DataFormat, VoxelType};
use async_trait::async_trait;
use ndarray::{s, ArrayView4, ArrayViewMut4};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Everything an engine needs to open the data of one mag
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSpec {
    /// Mag directory
    pub path: PathBuf,
    pub format: DataFormat,
    pub voxel_type: VoxelType,
    pub brick_size: BrickSize,
    pub tiff: Option<TiffOptions>,
    pub read_only: bool,
}

impl StorageSpec {
    /// Storage parameters of a registered resolution of a layer inside `dataset_path`
    pub fn for_resolution(
        dataset_path: &Path,
        layer: &LayerProperties,
        resolution: &ResolutionProperties,
        read_only: bool,
    ) -> Result<Self> {
        let dtype = dtype_per_layer_to_dtype_per_channel(&layer.element_class, layer.num_channels)?;
        let brick_size = match resolution.cube_length {
            Some(edge) => BrickSize::new(edge)?,
            None => BrickSize::default(),
        };
        Ok(Self {
            path: dataset_path.join(&layer.name).join(&resolution.path),
            format: layer.data_format,
            voxel_type: VoxelType::new(dtype, layer.num_channels),
            brick_size,
            tiff: layer.tiff.clone(),
            read_only,
        })
    }
}

/// Handle on the voxel data of one mag
#[async_trait]
pub trait MagStorage: Send + Sync {
    /// Read `size` voxels starting at `offset`; unwritten voxels are zero
    async fn read(&self, offset: [usize; 3], size: [usize; 3]) -> Result<VoxelBlock>;

    /// Write `block` with its first voxel at `offset`
    async fn write(&self, offset: [usize; 3], block: &VoxelBlock) -> Result<()>;

    fn voxel_type(&self) -> VoxelType;

    fn is_read_only(&self) -> bool;
}

/// Opens mag storage handles
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn open(&self, spec: &StorageSpec) -> Result<Arc<dyn MagStorage>>;
}

/// Engine storing mags as plain files below the dataset directory
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemEngine;

#[async_trait]
impl StorageEngine for FileSystemEngine {
    async fn open(&self, spec: &StorageSpec) -> Result<Arc<dyn MagStorage>> {
        if spec.read_only {
            if fs::metadata(&spec.path).await.is_err() {
                return Err(DatasetError::Storage(format!(
                    "no mag data at {}",
                    spec.path.display()
                )));
            }
        } else {
            fs::create_dir_all(&spec.path)
                .await
                .map_err(|e| DatasetError::filesystem("Creating mag directory", &spec.path, e))?;
        }

        match spec.format {
            DataFormat::Wkw => Ok(Arc::new(BrickStorage::new(spec))),
            DataFormat::Tiff | DataFormat::TiledTiff => Ok(Arc::new(TiffStorage::new(spec)?)),
        }
    }
}

/// Reject writes to read-only handles and blocks of the wrong voxel type
pub(crate) fn ensure_writable(storage: &dyn MagStorage, block: &VoxelBlock) -> Result<()> {
    if storage.is_read_only() {
        return Err(DatasetError::Storage(
            "cannot write through a read-only handle".to_string(),
        ));
    }
    if block.voxel_type() != storage.voxel_type() {
        return Err(DatasetError::InvalidDimensions(format!(
            "block has voxel type {}, storage expects {}",
            block.voxel_type(),
            storage.voxel_type()
        )));
    }
    Ok(())
}

/// Copy the overlap of `src` (covering `src_box`) into `dst` (covering `dst_box`)
///
/// Both arrays have axes `(z, y, x, voxel byte)`.
pub(crate) fn copy_overlap(
    src: ArrayView4<u8>,
    src_box: &BoundingBox,
    mut dst: ArrayViewMut4<u8>,
    dst_box: &BoundingBox,
) {
    let Some(overlap) = src_box.intersection(dst_box) else {
        return;
    };
    let local = |within: &BoundingBox| {
        let lo: [usize; 3] = std::array::from_fn(|i| overlap.topleft[i] - within.topleft[i]);
        let hi: [usize; 3] = std::array::from_fn(|i| lo[i] + overlap.size[i]);
        (lo, hi)
    };
    let (src_lo, src_hi) = local(src_box);
    let (dst_lo, dst_hi) = local(dst_box);

    dst.slice_mut(s![
        dst_lo[2]..dst_hi[2],
        dst_lo[1]..dst_hi[1],
        dst_lo[0]..dst_hi[0],
        ..
    ])
    .assign(&src.slice(s![
        src_lo[2]..src_hi[2],
        src_lo[1]..src_hi[1],
        src_lo[0]..src_hi[0],
        ..
    ]));
}
