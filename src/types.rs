//! Core data types for datasets and layers

use crate::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element type of a single channel sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Boolean, stored as a full byte
    Bool = 0,
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Unsigned 64-bit integer
    U64 = 4,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// Signed 64-bit integer
    I64 = 8,
    /// 32-bit floating point
    F32 = 9,
    /// 64-bit floating point
    F64 = 10,
}

impl DataType {
    pub const ALL: [DataType; 11] = [
        DataType::Bool,
        DataType::U8,
        DataType::U16,
        DataType::U32,
        DataType::U64,
        DataType::I8,
        DataType::I16,
        DataType::I32,
        DataType::I64,
        DataType::F32,
        DataType::F64,
    ];

    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
        }
    }

    /// Canonical dtype name, as written to the manifest
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
        }
    }
}

impl FromStr for DataType {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        DataType::ALL
            .iter()
            .copied()
            .find(|dtype| dtype.name() == s)
            .ok_or_else(|| DatasetError::TypeConversion(format!("'{}' is not a valid dtype", s)))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The full description of one voxel: channel dtype times channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelType {
    pub dtype: DataType,
    pub num_channels: usize,
}

impl VoxelType {
    pub fn new(dtype: DataType, num_channels: usize) -> Self {
        Self {
            dtype,
            num_channels,
        }
    }

    /// Bytes occupied by one voxel across all channels
    pub fn bytes_per_voxel(&self) -> usize {
        self.dtype.size_in_bytes() * self.num_channels
    }
}

impl fmt::Display for VoxelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.num_channels, self.dtype)
    }
}

/// Semantic kind of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Color,
    Segmentation,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Color => f.write_str("color"),
            Category::Segmentation => f.write_str("segmentation"),
        }
    }
}

/// On-disk format of a dataset and its layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// Chunked raw bricks
    #[default]
    Wkw,
    /// One image file per z-slice
    Tiff,
    /// One image file per (tile x, tile y, z)
    TiledTiff,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Wkw => f.write_str("wkw"),
            DataFormat::Tiff => f.write_str("tiff"),
            DataFormat::TiledTiff => f.write_str("tiled_tiff"),
        }
    }
}

/// Resolution identifier: per-axis downsampling factor relative to mag 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "[u32; 3]", into = "[u32; 3]")]
pub struct Mag([u32; 3]);

impl Mag {
    pub const ONE: Mag = Mag([1, 1, 1]);

    pub fn new(factors: [u32; 3]) -> Result<Self> {
        if let Some(bad) = factors.iter().find(|f| !f.is_power_of_two()) {
            return Err(DatasetError::InvalidMag(format!(
                "{:?}: factor {} is not a positive power of two",
                factors, bad
            )));
        }
        Ok(Self(factors))
    }

    pub fn factors(&self) -> [u32; 3] {
        self.0
    }

    /// Directory name of this mag inside a layer: "2" or "2-2-1"
    pub fn to_layer_name(&self) -> String {
        let [x, y, z] = self.0;
        if x == y && y == z {
            x.to_string()
        } else {
            format!("{}-{}-{}", x, y, z)
        }
    }
}

impl Default for Mag {
    fn default() -> Self {
        Mag::ONE
    }
}

impl TryFrom<[u32; 3]> for Mag {
    type Error = DatasetError;

    fn try_from(factors: [u32; 3]) -> Result<Self> {
        Mag::new(factors)
    }
}

impl From<Mag> for [u32; 3] {
    fn from(mag: Mag) -> Self {
        mag.0
    }
}

impl FromStr for Mag {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| DatasetError::InvalidMag(format!("'{}' is not a mag", s)))
        };
        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [single] => {
                let factor = parse(single)?;
                Mag::new([factor; 3])
            }
            [x, y, z] => Mag::new([parse(x)?, parse(y)?, parse(z)?]),
            _ => Err(DatasetError::InvalidMag(format!(
                "'{}' must be a single factor or x-y-z",
                s
            ))),
        }
    }
}

impl fmt::Display for Mag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_layer_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::U8.size_in_bytes(), 1);
        assert_eq!(DataType::U16.size_in_bytes(), 2);
        assert_eq!(DataType::F32.size_in_bytes(), 4);
        assert_eq!(DataType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn test_data_type_names() {
        for dtype in DataType::ALL {
            assert_eq!(dtype.name().parse::<DataType>().unwrap(), dtype);
        }
        assert!("uint24".parse::<DataType>().is_err());
        assert!("uint12".parse::<DataType>().is_err());
    }

    #[test]
    fn test_voxel_type() {
        let rgb = VoxelType::new(DataType::U8, 3);
        assert_eq!(rgb.bytes_per_voxel(), 3);
        assert_eq!(VoxelType::new(DataType::U16, 2).bytes_per_voxel(), 4);
    }

    #[test]
    fn test_mag_parsing() {
        assert_eq!("1".parse::<Mag>().unwrap(), Mag::ONE);
        assert_eq!("2-2-1".parse::<Mag>().unwrap().factors(), [2, 2, 1]);
        assert_eq!("4".parse::<Mag>().unwrap().to_layer_name(), "4");
        assert_eq!("2-2-1".parse::<Mag>().unwrap().to_layer_name(), "2-2-1");
        assert!("3".parse::<Mag>().is_err());
        assert!("0".parse::<Mag>().is_err());
        assert!("2-2".parse::<Mag>().is_err());
        assert!("abc".parse::<Mag>().is_err());
    }

    #[test]
    fn test_mag_serializes_as_vector() {
        let mag = Mag::new([2, 2, 1]).unwrap();
        assert_eq!(serde_json::to_string(&mag).unwrap(), "[2,2,1]");
        let back: Mag = serde_json::from_str("[2,2,1]").unwrap();
        assert_eq!(back, mag);
        assert!(serde_json::from_str::<Mag>("[3,1,1]").is_err());
    }

    #[test]
    fn test_format_and_category_serde() {
        assert_eq!(serde_json::to_string(&DataFormat::TiledTiff).unwrap(), "\"tiled_tiff\"");
        assert_eq!(serde_json::to_string(&Category::Segmentation).unwrap(), "\"segmentation\"");
    }
}
