//! Conversion between per-layer and per-channel element types
//!
//! A per-layer dtype describes one full multi-channel voxel, e.g. `"uint24"` for
//! three `uint8` channels. The string is split into a non-numeric kind and an
//! optional bit width; only the width takes part in the arithmetic.

use crate::error::{DatasetError, Result};
use crate::types::DataType;

/// Default bit depth of a channel when a layer is created without a dtype
pub const DEFAULT_BIT_DEPTH: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    LayerToChannel,
    ChannelToLayer,
}

/// Split a dtype string into its kind and optional bit width
fn split_dtype(dtype: &str) -> Result<(&str, Option<u32>)> {
    let digits_at = dtype
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(dtype.len());
    let (kind, width) = dtype.split_at(digits_at);

    if kind.is_empty() {
        return Err(DatasetError::TypeConversion(format!(
            "'{}' has no type kind",
            dtype
        )));
    }
    if width.is_empty() {
        return Ok((kind, None));
    }
    let width = width.parse::<u32>().map_err(|_| {
        DatasetError::TypeConversion(format!("'{}' is not of the form <kind><bits>", dtype))
    })?;
    Ok((kind, Some(width)))
}

fn convert(dtype: &str, num_channels: usize, direction: Direction) -> Result<String> {
    if num_channels == 0 {
        return Err(DatasetError::TypeConversion(
            "the number of channels must be positive".to_string(),
        ));
    }
    let (kind, width) = split_dtype(dtype)?;
    let Some(width) = width else {
        return Ok(kind.to_string());
    };

    let channels = u32::try_from(num_channels).map_err(|_| {
        DatasetError::TypeConversion(format!("{} channels is too many", num_channels))
    })?;
    let converted = match direction {
        Direction::LayerToChannel => {
            if width % channels != 0 {
                return Err(DatasetError::TypeConversion(format!(
                    "{} bits of '{}' cannot be split across {} channels",
                    width, dtype, num_channels
                )));
            }
            width / channels
        }
        Direction::ChannelToLayer => width.checked_mul(channels).ok_or_else(|| {
            DatasetError::TypeConversion(format!("'{}' x {} overflows", dtype, num_channels))
        })?,
    };
    Ok(format!("{}{}", kind, converted))
}

/// `"uint24"`, 3 channels -> `uint8`
pub fn dtype_per_layer_to_dtype_per_channel(
    dtype_per_layer: &str,
    num_channels: usize,
) -> Result<DataType> {
    let per_channel = convert(dtype_per_layer, num_channels, Direction::LayerToChannel)?;
    per_channel.parse::<DataType>().map_err(|e| {
        DatasetError::TypeConversion(format!(
            "Converting dtype_per_layer '{}' to dtype_per_channel failed. \
             Double check if the dtype_per_layer value is correct. {}",
            dtype_per_layer, e
        ))
    })
}

/// `uint8`, 3 channels -> `"uint24"`
pub fn dtype_per_channel_to_dtype_per_layer(
    dtype_per_channel: DataType,
    num_channels: usize,
) -> Result<String> {
    convert(dtype_per_channel.name(), num_channels, Direction::ChannelToLayer)
}

/// Per-layer dtype of a layer created without an explicit dtype
pub fn default_dtype_per_layer(num_channels: usize) -> String {
    format!("uint{}", DEFAULT_BIT_DEPTH as usize * num_channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_layer_to_per_channel() {
        assert_eq!(
            dtype_per_layer_to_dtype_per_channel("uint24", 3).unwrap(),
            DataType::U8
        );
        assert_eq!(
            dtype_per_layer_to_dtype_per_channel("uint8", 1).unwrap(),
            DataType::U8
        );
        assert_eq!(
            dtype_per_layer_to_dtype_per_channel("float64", 2).unwrap(),
            DataType::F32
        );
        assert_eq!(
            dtype_per_layer_to_dtype_per_channel("bool", 3).unwrap(),
            DataType::Bool
        );
    }

    #[test]
    fn test_per_channel_to_per_layer() {
        assert_eq!(
            dtype_per_channel_to_dtype_per_layer(DataType::U8, 3).unwrap(),
            "uint24"
        );
        assert_eq!(
            dtype_per_channel_to_dtype_per_layer(DataType::U16, 4).unwrap(),
            "uint64"
        );
        assert_eq!(
            dtype_per_channel_to_dtype_per_layer(DataType::Bool, 2).unwrap(),
            "bool"
        );
    }

    #[test]
    fn test_invalid_conversions() {
        // 24 / 2 = 12 bits is not a channel type
        assert!(matches!(
            dtype_per_layer_to_dtype_per_channel("uint24", 2),
            Err(DatasetError::TypeConversion(_))
        ));
        // not evenly divisible
        assert!(dtype_per_layer_to_dtype_per_channel("uint8", 3).is_err());
        assert!(dtype_per_layer_to_dtype_per_channel("", 1).is_err());
        assert!(dtype_per_layer_to_dtype_per_channel("24", 1).is_err());
        assert!(dtype_per_layer_to_dtype_per_channel("uint8x", 1).is_err());
        assert!(dtype_per_layer_to_dtype_per_channel("uint8", 0).is_err());
    }

    #[test]
    fn test_round_trip_for_used_widths() {
        let channel_types = [
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
        for dtype in channel_types {
            for num_channels in 1..=4 {
                let per_layer = dtype_per_channel_to_dtype_per_layer(dtype, num_channels).unwrap();
                let back = dtype_per_layer_to_dtype_per_channel(&per_layer, num_channels).unwrap();
                assert_eq!(back, dtype, "{} x {}", per_layer, num_channels);
            }
        }
    }

    #[test]
    fn test_default_dtype() {
        assert_eq!(default_dtype_per_layer(1), "uint8");
        assert_eq!(default_dtype_per_layer(3), "uint24");
    }
}
