//! Chunked storage - cubic bricks of raw voxel bytes

use super::{copy_overlap, ensure_writable, MagStorage, StorageSpec};
use crate::block::VoxelBlock;
use crate::error::{DatasetError, Result};
use crate::layout::{BoundingBox, BrickSize};
use crate::types::VoxelType;
use async_trait::async_trait;
use futures::future::try_join_all;
use ndarray::Array4;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Mag storage splitting the volume into `edge³` bricks at `z{k}/y{j}/x{i}.raw`
///
/// Brick files hold uncompressed bytes in `(z, y, x, voxel byte)` order.
/// Bricks that were never written read as zeros.
#[derive(Debug, Clone)]
pub struct BrickStorage {
    root: PathBuf,
    voxel_type: VoxelType,
    brick_size: BrickSize,
    read_only: bool,
}

impl BrickStorage {
    pub fn new(spec: &StorageSpec) -> Self {
        Self {
            root: spec.path.clone(),
            voxel_type: spec.voxel_type,
            brick_size: spec.brick_size,
            read_only: spec.read_only,
        }
    }

    fn brick_path(&self, brick: [usize; 3]) -> PathBuf {
        self.root
            .join(format!("z{}", brick[2]))
            .join(format!("y{}", brick[1]))
            .join(format!("x{}.raw", brick[0]))
    }

    fn brick_shape(&self) -> (usize, usize, usize, usize) {
        let edge = self.brick_size.edge();
        (edge, edge, edge, self.voxel_type.bytes_per_voxel())
    }

    async fn load_brick(&self, brick: [usize; 3]) -> Result<Option<Array4<u8>>> {
        let path = self.brick_path(brick);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DatasetError::filesystem("Reading brick", path, e)),
        };
        let expected = self.brick_size.total_voxels() * self.voxel_type.bytes_per_voxel();
        if bytes.len() != expected {
            return Err(DatasetError::Storage(format!(
                "corrupt brick {}: expected {} bytes, found {}",
                path.display(),
                expected,
                bytes.len()
            )));
        }
        Ok(Some(Array4::from_shape_vec(self.brick_shape(), bytes)?))
    }

    async fn store_brick(&self, brick: [usize; 3], data: &Array4<u8>) -> Result<()> {
        let path = self.brick_path(brick);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DatasetError::filesystem("Creating brick directory", parent, e))?;
        }
        let bytes: Vec<u8> = data.iter().copied().collect();
        fs::write(&path, bytes)
            .await
            .map_err(|e| DatasetError::filesystem("Writing brick", path, e))
    }
}

#[async_trait]
impl MagStorage for BrickStorage {
    async fn read(&self, offset: [usize; 3], size: [usize; 3]) -> Result<VoxelBlock> {
        let region = BoundingBox::new(offset, size);
        let mut block = VoxelBlock::zeros(size, self.voxel_type);

        // Read all bricks concurrently
        let bricks = self.brick_size.bricks_in(&region);
        let loaded = try_join_all(bricks.iter().map(|&brick| async move {
            self.load_brick(brick).await.map(|data| (brick, data))
        }))
        .await?;

        for (brick, data) in loaded {
            let Some(data) = data else { continue };
            copy_overlap(
                data.view(),
                &self.brick_size.brick_bounds(brick),
                block.data_mut().view_mut(),
                &region,
            );
        }
        Ok(block)
    }

    async fn write(&self, offset: [usize; 3], block: &VoxelBlock) -> Result<()> {
        ensure_writable(self, block)?;
        let region = BoundingBox::new(offset, block.size());
        let bricks = self.brick_size.bricks_in(&region);
        debug!(
            "Writing {} to {} brick(s) under {}",
            region,
            bricks.len(),
            self.root.display()
        );

        for brick in bricks {
            let mut data = match self.load_brick(brick).await? {
                Some(data) => data,
                None => Array4::zeros(self.brick_shape()),
            };
            copy_overlap(
                block.data().view(),
                &region,
                data.view_mut(),
                &self.brick_size.brick_bounds(brick),
            );
            self.store_brick(brick, &data).await?;
        }
        Ok(())
    }

    fn voxel_type(&self) -> VoxelType {
        self.voxel_type
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
