//! Image-file storage - one tiff per z-slice, or per (tile x, tile y, z)

use super::{copy_overlap, ensure_writable, MagStorage, StorageSpec};
use crate::block::{Plane, VoxelBlock};
use crate::codec::{decode_tiff, encode_tiff};
use crate::error::{DatasetError, Result};
use crate::layout::BoundingBox;
use crate::pattern::expand_pattern;
use crate::types::{DataFormat, VoxelType};
use async_trait::async_trait;
use ndarray::{s, Axis as NdAxis};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Mag storage of the tiff formats
///
/// Without a tile size every z-slice is a single image anchored at x = y = 0
/// that grows as data is written. With a tile size `[w, h]` the slice is cut
/// into fixed `w x h` images indexed by tile position.
#[derive(Debug, Clone)]
pub struct TiffStorage {
    root: PathBuf,
    voxel_type: VoxelType,
    pattern: String,
    tile_size: Option<[usize; 2]>,
    read_only: bool,
}

impl TiffStorage {
    pub fn new(spec: &StorageSpec) -> Result<Self> {
        let options = spec.tiff.as_ref().ok_or_else(|| {
            DatasetError::Storage(format!(
                "{} mag at {} has no file pattern",
                spec.format,
                spec.path.display()
            ))
        })?;
        if spec.format == DataFormat::TiledTiff && options.tile_size.is_none() {
            return Err(DatasetError::Storage(format!(
                "tiled mag at {} has no tile size",
                spec.path.display()
            )));
        }
        if let Some([w, h]) = options.tile_size {
            if w == 0 || h == 0 {
                return Err(DatasetError::InvalidDimensions(format!(
                    "tile size [{}, {}] must be positive",
                    w, h
                )));
            }
        }
        Ok(Self {
            root: spec.path.clone(),
            voxel_type: spec.voxel_type,
            pattern: options.pattern.clone(),
            tile_size: options.tile_size,
            read_only: spec.read_only,
        })
    }

    fn tiles_in(&self, region: &BoundingBox) -> Vec<[usize; 2]> {
        let Some([w, h]) = self.tile_size else {
            return vec![[0, 0]];
        };
        let end = region.end();
        let mut tiles = Vec::new();
        for ty in region.topleft[1] / h..=(end[1] - 1) / h {
            for tx in region.topleft[0] / w..=(end[0] - 1) / w {
                tiles.push([tx, ty]);
            }
        }
        tiles
    }

    fn tile_origin(&self, tile: [usize; 2]) -> [usize; 2] {
        match self.tile_size {
            Some([w, h]) => [tile[0] * w, tile[1] * h],
            None => [0, 0],
        }
    }

    fn tile_path(&self, tile: [usize; 2], z: usize) -> Result<PathBuf> {
        Ok(self.root.join(expand_pattern(&self.pattern, tile[0], tile[1], z)?))
    }

    async fn load_tile(&self, path: &Path) -> Result<Option<Plane>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(decode_tiff(&bytes, self.voxel_type)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DatasetError::filesystem("Reading tiff", path, e)),
        }
    }
}

/// Pad `plane` with zeros to at least `height x width`
fn grow(plane: Plane, height: usize, width: usize) -> Plane {
    if plane.height() >= height && plane.width() >= width {
        return plane;
    }
    let mut grown = Plane::zeros(
        plane.height().max(height),
        plane.width().max(width),
        plane.voxel_type,
    );
    grown
        .data
        .slice_mut(s![..plane.height(), ..plane.width(), ..])
        .assign(&plane.data);
    grown
}

#[async_trait]
impl MagStorage for TiffStorage {
    async fn read(&self, offset: [usize; 3], size: [usize; 3]) -> Result<VoxelBlock> {
        let region = BoundingBox::new(offset, size);
        let mut block = VoxelBlock::zeros(size, self.voxel_type);
        if region.is_empty() {
            return Ok(block);
        }

        for z in offset[2]..offset[2] + size[2] {
            for tile in self.tiles_in(&region) {
                let Some(plane) = self.load_tile(&self.tile_path(tile, z)?).await? else {
                    continue;
                };
                let [ox, oy] = self.tile_origin(tile);
                let tile_box = BoundingBox::new([ox, oy, z], [plane.width(), plane.height(), 1]);
                copy_overlap(
                    plane.data.view().insert_axis(NdAxis(0)),
                    &tile_box,
                    block.data_mut().view_mut(),
                    &region,
                );
            }
        }
        Ok(block)
    }

    async fn write(&self, offset: [usize; 3], block: &VoxelBlock) -> Result<()> {
        ensure_writable(self, block)?;
        let region = BoundingBox::new(offset, block.size());
        if region.is_empty() {
            return Ok(());
        }
        let end = region.end();

        for z in offset[2]..end[2] {
            for tile in self.tiles_in(&region) {
                let path = self.tile_path(tile, z)?;
                let [ox, oy] = self.tile_origin(tile);
                let (height, width) = match self.tile_size {
                    Some([w, h]) => (h, w),
                    None => (end[1], end[0]),
                };
                let mut plane = match self.load_tile(&path).await? {
                    Some(existing) => grow(existing, height, width),
                    None => Plane::zeros(height, width, self.voxel_type),
                };
                let tile_box = BoundingBox::new([ox, oy, z], [plane.width(), plane.height(), 1]);
                copy_overlap(
                    block.data().view(),
                    &region,
                    plane.data.view_mut().insert_axis(NdAxis(0)),
                    &tile_box,
                );

                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await.map_err(|e| {
                        DatasetError::filesystem("Creating tiff directory", parent, e)
                    })?;
                }
                let encoded = encode_tiff(&plane)?;
                fs::write(&path, &encoded)
                    .await
                    .map_err(|e| DatasetError::filesystem("Writing tiff", &path, e))?;
            }
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
