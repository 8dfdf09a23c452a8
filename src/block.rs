//! In-memory voxel data exchanged with the storage engine

use crate::error::{DatasetError, Result};
use crate::layout::Axis;
use crate::types::VoxelType;
use ndarray::{Array3, Array4, Axis as NdAxis};

/// A box of voxels
///
/// Stored as raw little-endian bytes with array axes `(z, y, x, voxel byte)`,
/// so channels are interleaved and x varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelBlock {
    voxel_type: VoxelType,
    data: Array4<u8>,
}

impl VoxelBlock {
    /// A zero-filled block of `size = [x, y, z]` voxels
    pub fn zeros(size: [usize; 3], voxel_type: VoxelType) -> Self {
        let [x, y, z] = size;
        Self {
            voxel_type,
            data: Array4::zeros((z, y, x, voxel_type.bytes_per_voxel())),
        }
    }

    /// Wrap raw bytes laid out x fastest, then y, then z
    pub fn from_bytes(size: [usize; 3], voxel_type: VoxelType, bytes: Vec<u8>) -> Result<Self> {
        let [x, y, z] = size;
        let expected = x * y * z * voxel_type.bytes_per_voxel();
        if bytes.len() != expected {
            return Err(DatasetError::InvalidDimensions(format!(
                "Data size mismatch: expected {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }
        let data = Array4::from_shape_vec((z, y, x, voxel_type.bytes_per_voxel()), bytes)?;
        Ok(Self { voxel_type, data })
    }

    pub fn voxel_type(&self) -> VoxelType {
        self.voxel_type
    }

    /// Size as `[x, y, z]`
    pub fn size(&self) -> [usize; 3] {
        let (z, y, x, _) = self.data.dim();
        [x, y, z]
    }

    pub fn data(&self) -> &Array4<u8> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array4<u8> {
        &mut self.data
    }

    /// Raw bytes of the voxel at `[x, y, z]`
    pub fn voxel(&self, position: [usize; 3]) -> Vec<u8> {
        let [x, y, z] = position;
        self.data
            .index_axis(NdAxis(0), z)
            .index_axis(NdAxis(0), y)
            .index_axis(NdAxis(0), x)
            .to_vec()
    }

    /// Raw bytes, x fastest
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    /// Drop the singleton `axis`, leaving a 2D plane
    ///
    /// Rows of the plane run along the later remaining axis, columns along the
    /// earlier one, so an `Axis::Z` slice has y rows of x columns.
    pub fn into_plane(self, axis: Axis) -> Result<Plane> {
        let size = self.size();
        if size[axis.index()] != 1 {
            return Err(DatasetError::InvalidDimensions(format!(
                "Cannot squeeze {} axis of a block with size {:?}",
                axis, size
            )));
        }
        // array axes are (z, y, x, bytes)
        let array_axis = 2 - axis.index();
        let data = self.data.index_axis_move(NdAxis(array_axis), 0);
        Ok(Plane {
            voxel_type: self.voxel_type,
            data,
        })
    }
}

/// A 2D image of voxels with array axes `(row, column, voxel byte)`
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub voxel_type: VoxelType,
    pub data: Array3<u8>,
}

impl Plane {
    pub fn zeros(height: usize, width: usize, voxel_type: VoxelType) -> Self {
        Self {
            voxel_type,
            data: Array3::zeros((height, width, voxel_type.bytes_per_voxel())),
        }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// Raw bytes in row-major order
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }
}
