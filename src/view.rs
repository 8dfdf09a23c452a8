//! Windowed read/write access to one mag of a layer

use crate::block::VoxelBlock;
use crate::error::{DatasetError, Result};
use crate::layout::BoundingBox;
use crate::storage::MagStorage;
use crate::types::VoxelType;
use std::fmt;
use std::sync::Arc;

/// A window of `size` voxels at `offset` onto a mag's storage
///
/// Offsets passed to [`View::read`] and [`View::write`] are relative to the
/// window. A bounded view refuses any access reaching outside it.
#[derive(Clone)]
pub struct View {
    storage: Arc<dyn MagStorage>,
    offset: [usize; 3],
    size: [usize; 3],
    is_bounded: bool,
}

impl View {
    pub fn new(
        storage: Arc<dyn MagStorage>,
        offset: [usize; 3],
        size: [usize; 3],
        is_bounded: bool,
    ) -> Self {
        Self {
            storage,
            offset,
            size,
            is_bounded,
        }
    }

    pub fn offset(&self) -> [usize; 3] {
        self.offset
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn is_bounded(&self) -> bool {
        self.is_bounded
    }

    pub fn voxel_type(&self) -> VoxelType {
        self.storage.voxel_type()
    }

    /// Absolute region covered by the view
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.offset, self.size)
    }

    fn absolute(&self, relative_offset: [usize; 3], size: [usize; 3]) -> Result<BoundingBox> {
        let relative = BoundingBox::new(relative_offset, size);
        if self.is_bounded && !BoundingBox::new([0, 0, 0], self.size).contains_box(&relative) {
            return Err(DatasetError::OutOfBounds(format!(
                "{} is outside the view of size {:?}",
                relative, self.size
            )));
        }
        let topleft = std::array::from_fn(|i| self.offset[i] + relative_offset[i]);
        Ok(BoundingBox::new(topleft, size))
    }

    /// Read `size` voxels at `relative_offset`
    pub async fn read(&self, relative_offset: [usize; 3], size: [usize; 3]) -> Result<VoxelBlock> {
        let region = self.absolute(relative_offset, size)?;
        self.storage.read(region.topleft, region.size).await
    }

    /// Read the whole window
    pub async fn read_all(&self) -> Result<VoxelBlock> {
        self.read([0, 0, 0], self.size).await
    }

    /// Write `block` at `relative_offset`
    pub async fn write(&self, relative_offset: [usize; 3], block: &VoxelBlock) -> Result<()> {
        let region = self.absolute(relative_offset, block.size())?;
        self.storage.write(region.topleft, block).await
    }

    /// A view on a sub-window, offset relative to this one
    pub fn get_view(
        &self,
        relative_offset: [usize; 3],
        size: [usize; 3],
        is_bounded: bool,
    ) -> Result<View> {
        let region = self.absolute(relative_offset, size)?;
        Ok(View::new(
            Arc::clone(&self.storage),
            region.topleft,
            region.size,
            is_bounded,
        ))
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("is_bounded", &self.is_bounded)
            .field("voxel_type", &self.voxel_type())
            .finish()
    }
}
