//! Creation options for datasets and layers

use crate::dtype::{
    default_dtype_per_layer, dtype_per_channel_to_dtype_per_layer,
    dtype_per_layer_to_dtype_per_channel,
};
use crate::error::{DatasetError, Result};
use crate::pattern::{validate_pattern, DEFAULT_TIFF_PATTERN, DEFAULT_TILED_TIFF_PATTERN};
use crate::properties::{DatasetProperties, TiffOptions};
use crate::types::{Category, DataFormat, DataType};

/// Storage format of a new dataset
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormatOptions {
    /// Chunked raw bricks
    #[default]
    Wkw,
    /// One image per z-slice; `pattern` defaults to `{zzzzz}.tif`
    Tiff { pattern: Option<String> },
    /// One image per tile and z-slice; `pattern` defaults to
    /// `{xxxxx}/{yyyyy}/{zzzzz}.tif`
    TiledTiff {
        tile_size: [usize; 2],
        pattern: Option<String>,
    },
}

impl FormatOptions {
    pub fn data_format(&self) -> DataFormat {
        match self {
            FormatOptions::Wkw => DataFormat::Wkw,
            FormatOptions::Tiff { .. } => DataFormat::Tiff,
            FormatOptions::TiledTiff { .. } => DataFormat::TiledTiff,
        }
    }

    fn requested_pattern(&self) -> Option<&str> {
        match self {
            FormatOptions::Wkw => None,
            FormatOptions::Tiff { pattern } | FormatOptions::TiledTiff { pattern, .. } => {
                pattern.as_deref()
            }
        }
    }

    /// Validated pattern and tile size to record in the manifest
    pub fn tiff_options(&self) -> Result<Option<TiffOptions>> {
        let (default_pattern, tile_size) = match self {
            FormatOptions::Wkw => return Ok(None),
            FormatOptions::Tiff { .. } => (DEFAULT_TIFF_PATTERN, None),
            FormatOptions::TiledTiff { tile_size, .. } => {
                if tile_size.contains(&0) {
                    return Err(DatasetError::InvalidDimensions(format!(
                        "tile size {:?} must be positive",
                        tile_size
                    )));
                }
                (DEFAULT_TILED_TIFF_PATTERN, Some(*tile_size))
            }
        };
        let pattern = self.requested_pattern().unwrap_or(default_pattern);
        validate_pattern(pattern)?;
        Ok(Some(TiffOptions {
            pattern: pattern.to_string(),
            tile_size,
        }))
    }

    /// Check an existing manifest against these options
    ///
    /// The pattern is only compared when one was requested.
    pub fn check_matches(&self, properties: &DatasetProperties) -> Result<()> {
        if properties.data_format != self.data_format() {
            return Err(DatasetError::ConfigMismatch(format!(
                "the dataset is stored as {}, not {}",
                properties.data_format,
                self.data_format()
            )));
        }
        let existing = properties.tiff.as_ref();
        if let FormatOptions::TiledTiff { tile_size, .. } = self {
            let existing_size = existing.and_then(|t| t.tile_size);
            if existing_size != Some(*tile_size) {
                return Err(DatasetError::ConfigMismatch(format!(
                    "the tile sizes do not match ({:?} != {:?})",
                    existing_size, tile_size
                )));
            }
        }
        if let Some(pattern) = self.requested_pattern() {
            let existing_pattern = existing.map(|t| t.pattern.as_str());
            if existing_pattern != Some(pattern) {
                return Err(DatasetError::ConfigMismatch(format!(
                    "the patterns do not match ({:?} != '{}')",
                    existing_pattern, pattern
                )));
            }
        }
        Ok(())
    }
}

/// Description of a layer to add
///
/// At most one of the per-layer and per-channel dtypes may be given; without
/// either the layer stores `uint8` per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: String,
    pub category: Category,
    pub dtype_per_layer: Option<String>,
    pub dtype_per_channel: Option<String>,
    pub num_channels: Option<usize>,
    pub largest_segment_id: Option<u64>,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
            dtype_per_layer: None,
            dtype_per_channel: None,
            num_channels: None,
            largest_segment_id: None,
        }
    }

    pub fn color(name: impl Into<String>) -> Self {
        Self::new(name, Category::Color)
    }

    pub fn segmentation(name: impl Into<String>) -> Self {
        Self::new(name, Category::Segmentation)
    }

    pub fn with_dtype_per_layer(mut self, dtype: impl Into<String>) -> Self {
        self.dtype_per_layer = Some(dtype.into());
        self
    }

    pub fn with_dtype_per_channel(mut self, dtype: impl Into<String>) -> Self {
        self.dtype_per_channel = Some(dtype.into());
        self
    }

    pub fn with_num_channels(mut self, num_channels: usize) -> Self {
        self.num_channels = Some(num_channels);
        self
    }

    pub fn with_largest_segment_id(mut self, id: u64) -> Self {
        self.largest_segment_id = Some(id);
        self
    }

    /// Per-channel dtype and per-layer dtype string for `num_channels` channels
    pub(crate) fn resolve_dtypes(&self, num_channels: usize) -> Result<(DataType, String)> {
        if num_channels == 0 {
            return Err(DatasetError::InvalidDimensions(format!(
                "layer '{}' needs at least one channel",
                self.name
            )));
        }
        match (&self.dtype_per_layer, &self.dtype_per_channel) {
            (Some(_), Some(_)) => Err(DatasetError::AmbiguousDtype),
            (Some(per_layer), None) => {
                let per_channel = dtype_per_layer_to_dtype_per_channel(per_layer, num_channels)?;
                Ok((per_channel, per_layer.clone()))
            }
            (None, Some(per_channel)) => {
                let per_channel: DataType = per_channel.parse().map_err(|e| {
                    DatasetError::TypeConversion(format!(
                        "The specified 'dtype_per_channel' must be a valid dtype. {}",
                        e
                    ))
                })?;
                let per_layer = dtype_per_channel_to_dtype_per_layer(per_channel, num_channels)?;
                Ok((per_channel, per_layer))
            }
            (None, None) => Ok((DataType::U8, default_dtype_per_layer(num_channels))),
        }
    }

    pub(crate) fn has_dtype(&self) -> bool {
        self.dtype_per_layer.is_some() || self.dtype_per_channel.is_some()
    }
}
