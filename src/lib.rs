//! wkdataset - multi-resolution volumetric datasets on disk
//!
//! A dataset is a directory with a `datasource-properties.json` manifest and
//! one subdirectory per layer. Every layer is a typed channel stack stored at
//! one or more mags (resolutions).
//!
//! # Features
//!
//! - Dataset and layer management kept in lock-step with the manifest
//! - Chunked (`wkw`), tiff-per-slice and tiled-tiff storage formats
//! - Per-layer / per-channel dtype conversion (`"uint24"` <-> 3 x `uint8`)
//! - Layer import from other datasets by symlink or copy
//! - Slice-wise export of a region to tiff stacks on a pluggable executor
//! - Async I/O throughout
//!
//! # Example
//!
//! ```rust,ignore
//! use wkdataset::{Dataset, FormatOptions, LayerSpec, Mag};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut dataset = Dataset::create("/data/my_dataset", [11.24, 11.24, 25.0], FormatOptions::Wkw).await?;
//! dataset.add_layer(LayerSpec::color("color").with_num_channels(3)).await?;
//! dataset.add_mag("color", Mag::ONE).await?;
//!
//! let view = dataset.get_view("color", Mag::ONE, [512, 512, 64], None, true)?;
//! let block = view.read_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod dtype;
pub mod error;
pub mod executor;
pub mod export;
pub mod import;
pub mod layer;
pub mod layout;
pub mod options;
pub mod pattern;
pub mod properties;
pub mod storage;
pub mod types;
pub mod utils;
pub mod view;

// Re-exports
pub use block::{Plane, VoxelBlock};
pub use codec::{ImageEncoder, TiffEncoder};
pub use dataset::Dataset;
pub use error::{DatasetError, Result};
pub use executor::{Executor, ParallelExecutor, SequentialExecutor};
pub use export::{export_tiff_stack, ExportRequest, ExportSummary};
pub use import::{CopyImporter, LayerImporter, SymlinkImporter};
pub use layer::{Layer, MagDataset};
pub use layout::{Axis, BoundingBox};
pub use options::{FormatOptions, LayerSpec};
pub use properties::{DatasetProperties, LayerProperties, PROPERTIES_FILE_NAME};
pub use storage::{FileSystemEngine, MagStorage, MemoryEngine, StorageEngine};
pub use types::{Category, DataFormat, DataType, Mag, VoxelType};
pub use view::View;

/// Version of the wkdataset crate
pub const WKDATASET_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!WKDATASET_VERSION.is_empty());
    }
}
