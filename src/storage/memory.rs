//! In-memory storage engine

use super::{copy_overlap, ensure_writable, MagStorage, StorageEngine, StorageSpec};
use crate::block::VoxelBlock;
use crate::error::{DatasetError, Result};
use crate::layout::BoundingBox;
use crate::types::VoxelType;
use async_trait::async_trait;
use ndarray::{s, Array4};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Voxels of one mag, growing from the origin as they are written
struct MemoryVolume {
    voxel_type: VoxelType,
    data: RwLock<Array4<u8>>,
}

impl MemoryVolume {
    fn extent(data: &Array4<u8>) -> BoundingBox {
        let (z, y, x, _) = data.dim();
        BoundingBox::new([0, 0, 0], [x, y, z])
    }
}

/// Handle on a [`MemoryVolume`]
struct MemoryStorage {
    volume: Arc<MemoryVolume>,
    read_only: bool,
}

#[async_trait]
impl MagStorage for MemoryStorage {
    async fn read(&self, offset: [usize; 3], size: [usize; 3]) -> Result<VoxelBlock> {
        let region = BoundingBox::new(offset, size);
        let mut block = VoxelBlock::zeros(size, self.volume.voxel_type);
        let data = self.volume.data.read();
        copy_overlap(
            data.view(),
            &MemoryVolume::extent(&data),
            block.data_mut().view_mut(),
            &region,
        );
        Ok(block)
    }

    async fn write(&self, offset: [usize; 3], block: &VoxelBlock) -> Result<()> {
        ensure_writable(self, block)?;
        let region = BoundingBox::new(offset, block.size());
        let end = region.end();
        let mut data = self.volume.data.write();

        let (z, y, x, bytes) = data.dim();
        if end[0] > x || end[1] > y || end[2] > z {
            let mut grown = Array4::zeros((z.max(end[2]), y.max(end[1]), x.max(end[0]), bytes));
            grown.slice_mut(s![..z, ..y, ..x, ..]).assign(&*data);
            *data = grown;
        }
        let extent = MemoryVolume::extent(&data);
        copy_overlap(block.data().view(), &region, data.view_mut(), &extent);
        Ok(())
    }

    fn voxel_type(&self) -> VoxelType {
        self.volume.voxel_type
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// Engine keeping every mag in memory, keyed by its path
///
/// Clones share the same volumes.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    volumes: Arc<Mutex<HashMap<PathBuf, Arc<MemoryVolume>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mags opened for writing so far
    pub fn len(&self) -> usize {
        self.volumes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn open(&self, spec: &StorageSpec) -> Result<Arc<dyn MagStorage>> {
        let mut volumes = self.volumes.lock();
        let volume = match volumes.get(&spec.path) {
            Some(volume) => {
                if volume.voxel_type != spec.voxel_type {
                    return Err(DatasetError::Storage(format!(
                        "{} holds {} voxels, not {}",
                        spec.path.display(),
                        volume.voxel_type,
                        spec.voxel_type
                    )));
                }
                Arc::clone(volume)
            }
            None if spec.read_only => {
                return Err(DatasetError::Storage(format!(
                    "no mag data at {}",
                    spec.path.display()
                )));
            }
            None => {
                let volume = Arc::new(MemoryVolume {
                    voxel_type: spec.voxel_type,
                    data: RwLock::new(Array4::zeros((0, 0, 0, spec.voxel_type.bytes_per_voxel()))),
                });
                volumes.insert(spec.path.clone(), Arc::clone(&volume));
                volume
            }
        };
        Ok(Arc::new(MemoryStorage {
            volume,
            read_only: spec.read_only,
        }))
    }
}
