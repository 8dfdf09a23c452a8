//! Voxel-space geometry - bounding boxes, axes and the brick grid of chunked storage

use crate::error::{DatasetError, Result};
use crate::types::Mag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three principal axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Index of this axis in `[x, y, z]` vectors
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// The two remaining axes, in `x, y, z` order
    pub fn plane_axes(&self) -> [usize; 2] {
        match self {
            Axis::X => [1, 2],
            Axis::Y => [0, 2],
            Axis::Z => [0, 1],
        }
    }
}

impl FromStr for Axis {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(DatasetError::InvalidAxis(other.to_string())),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("x"),
            Axis::Y => f.write_str("y"),
            Axis::Z => f.write_str("z"),
        }
    }
}

/// Axis-aligned voxel region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "BoundingBoxJson", into = "BoundingBoxJson")]
pub struct BoundingBox {
    pub topleft: [usize; 3],
    pub size: [usize; 3],
}

/// Manifest shape of a bounding box
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingBoxJson {
    top_left: [usize; 3],
    width: usize,
    height: usize,
    depth: usize,
}

impl From<BoundingBoxJson> for BoundingBox {
    fn from(json: BoundingBoxJson) -> Self {
        BoundingBox::new(json.top_left, [json.width, json.height, json.depth])
    }
}

impl From<BoundingBox> for BoundingBoxJson {
    fn from(bbox: BoundingBox) -> Self {
        BoundingBoxJson {
            top_left: bbox.topleft,
            width: bbox.size[0],
            height: bbox.size[1],
            depth: bbox.size[2],
        }
    }
}

impl BoundingBox {
    pub fn new(topleft: [usize; 3], size: [usize; 3]) -> Self {
        Self { topleft, size }
    }

    /// Exclusive upper corner
    pub fn end(&self) -> [usize; 3] {
        [
            self.topleft[0] + self.size[0],
            self.topleft[1] + self.size[1],
            self.topleft[2] + self.size[2],
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    pub fn volume(&self) -> usize {
        self.size.iter().product()
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        let (end, other_end) = (self.end(), other.end());
        (0..3).all(|i| self.topleft[i] <= other.topleft[i] && other_end[i] <= end[i])
    }

    /// Smallest box containing both; an empty box is the identity
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let (end, other_end) = (self.end(), other.end());
        let mut topleft = [0; 3];
        let mut size = [0; 3];
        for i in 0..3 {
            topleft[i] = self.topleft[i].min(other.topleft[i]);
            size[i] = end[i].max(other_end[i]) - topleft[i];
        }
        BoundingBox::new(topleft, size)
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let (end, other_end) = (self.end(), other.end());
        let mut topleft = [0; 3];
        let mut size = [0; 3];
        for i in 0..3 {
            topleft[i] = self.topleft[i].max(other.topleft[i]);
            let stop = end[i].min(other_end[i]);
            if stop <= topleft[i] {
                return None;
            }
            size[i] = stop - topleft[i];
        }
        Some(BoundingBox::new(topleft, size))
    }

    /// Convert mag-1 coordinates to the given mag, keeping every covered voxel
    pub fn in_mag(&self, mag: &Mag) -> BoundingBox {
        let factors = mag.factors();
        let end = self.end();
        let mut topleft = [0; 3];
        let mut size = [0; 3];
        for i in 0..3 {
            let factor = factors[i] as usize;
            topleft[i] = self.topleft[i] / factor;
            size[i] = end[i].div_ceil(factor) - topleft[i];
        }
        BoundingBox::new(topleft, size)
    }

    /// Convert coordinates at the given mag back to mag 1
    pub fn to_mag1(&self, mag: &Mag) -> BoundingBox {
        let factors = mag.factors();
        let mut topleft = self.topleft;
        let mut size = self.size;
        for i in 0..3 {
            topleft[i] *= factors[i] as usize;
            size[i] *= factors[i] as usize;
        }
        BoundingBox::new(topleft, size)
    }
}

impl FromStr for BoundingBox {
    type Err = DatasetError;

    /// Parse `"x,y,z,width,height,depth"`
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| DatasetError::InvalidBoundingBox(format!("'{}': {}", s, e)))?;
        match values.as_slice() {
            &[x, y, z, w, h, d] => {
                if [(x, w), (y, h), (z, d)]
                    .iter()
                    .any(|(start, len)| start.checked_add(*len).is_none())
                {
                    return Err(DatasetError::InvalidBoundingBox(format!(
                        "'{}' ends beyond the largest coordinate",
                        s
                    )));
                }
                Ok(BoundingBox::new([x, y, z], [w, h, d]))
            }
            _ => Err(DatasetError::InvalidBoundingBox(format!(
                "'{}' needs exactly 6 integers (topleft and size)",
                s
            ))),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topleft {:?}, size {:?}",
            self.topleft, self.size
        )
    }
}

/// Edge length of the cubic bricks chunked storage is divided into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrickSize(usize);

impl BrickSize {
    pub fn new(edge: usize) -> Result<Self> {
        if edge == 0 {
            return Err(DatasetError::InvalidDimensions(
                "Brick edge length must be positive".to_string(),
            ));
        }
        Ok(Self(edge))
    }

    pub fn edge(&self) -> usize {
        self.0
    }

    /// Total number of voxels in a brick
    pub fn total_voxels(&self) -> usize {
        self.0 * self.0 * self.0
    }

    /// Region covered by the brick at the given brick coordinates
    pub fn brick_bounds(&self, brick: [usize; 3]) -> BoundingBox {
        BoundingBox::new(
            [brick[0] * self.0, brick[1] * self.0, brick[2] * self.0],
            [self.0; 3],
        )
    }

    /// Coordinates of every brick overlapping the region, x fastest
    pub fn bricks_in(&self, region: &BoundingBox) -> Vec<[usize; 3]> {
        if region.is_empty() {
            return Vec::new();
        }
        let end = region.end();
        let min: Vec<usize> = (0..3).map(|i| region.topleft[i] / self.0).collect();
        let max: Vec<usize> = (0..3).map(|i| (end[i] - 1) / self.0).collect();

        let mut bricks = Vec::new();
        for z in min[2]..=max[2] {
            for y in min[1]..=max[1] {
                for x in min[0]..=max[0] {
                    bricks.push([x, y, z]);
                }
            }
        }
        bricks
    }
}

impl Default for BrickSize {
    fn default() -> Self {
        Self(32)
    }
}
