//! Configuration of the `wk-export-tiff` tool
//!
//! Every option is a command-line flag; the executor options can also be set
//! through the environment:
//!
//! - `WK_DISTRIBUTION_STRATEGY` - `sequential` or `parallel` (default: parallel)
//! - `WK_JOBS` - Number of parallel workers (default: one per CPU)

use crate::error::{DatasetError, Result};
use crate::executor::{AnyExecutor, ParallelExecutor, SequentialExecutor};
use crate::export::ExportRequest;
use crate::layout::{Axis, BoundingBox};
use crate::properties::DatasetProperties;
use crate::types::Mag;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

/// Layer exported when none is named
pub const DEFAULT_LAYER_NAME: &str = "color";

/// How slice jobs are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DistributionStrategy {
    /// One slice after another
    Sequential,
    /// Slices on a pool of workers
    Parallel,
}

/// Tile size `a,b` along the two axes of a slice plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tiling(pub [usize; 2]);

impl FromStr for Tiling {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let invalid = || {
            DatasetError::InvalidDimensions(format!("tiling '{}' must be two integers 'a,b'", s))
        };
        match parts.as_slice() {
            [a, b] => Ok(Tiling([
                a.parse().map_err(|_| invalid())?,
                b.parse().map_err(|_| invalid())?,
            ])),
            _ => Err(invalid()),
        }
    }
}

/// Export a layer of a dataset as a stack of tiff images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wk-export-tiff")]
#[command(author, version, about, long_about = None)]
pub struct ExportArgs {
    /// Directory containing the dataset.
    #[arg(short = 's', long)]
    pub source_path: PathBuf,

    /// Output directory for the tiff files.
    #[arg(short = 'd', long)]
    pub destination_path: PathBuf,

    /// Name of the layer that will be converted to a tiff stack.
    #[arg(short = 'l', long, default_value = DEFAULT_LAYER_NAME)]
    pub layer_name: String,

    /// Base name of the tiff files.
    ///
    /// Defaults to the dataset name in the manifest.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// The axis the images are taken along; z yields x,y slices.
    #[arg(short = 'a', long, default_value = "z")]
    pub axis: Axis,

    /// Split every slice into tiles, e.g. "x,y" when the axis is z.
    #[arg(short = 't', long)]
    pub tiling: Option<Tiling>,

    /// Region to export as "x,y,z,width,height,depth" at the exported mag.
    ///
    /// Defaults to the recorded extent of the layer.
    #[arg(short = 'b', long)]
    pub bbox: Option<BoundingBox>,

    /// The mag that is read, e.g. "1", "2" or "2-2-1".
    #[arg(short = 'm', long, default_value = "1")]
    pub mag: Mag,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// How slice jobs are run.
    #[arg(
        long,
        value_enum,
        default_value_t = DistributionStrategy::Parallel,
        env = "WK_DISTRIBUTION_STRATEGY"
    )]
    pub distribution_strategy: DistributionStrategy,

    /// Number of parallel workers.
    #[arg(short = 'j', long, env = "WK_JOBS")]
    pub jobs: Option<usize>,
}

impl ExportArgs {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.layer_name.is_empty() {
            return Err("layer name must not be empty".to_string());
        }
        if self.jobs == Some(0) {
            return Err("jobs must be greater than 0".to_string());
        }
        if let Some(Tiling(tiling)) = self.tiling {
            if tiling.contains(&0) {
                return Err(format!("tiling {:?} must be positive", tiling));
            }
        }
        if self.source_path == self.destination_path {
            return Err("destination path must differ from the source path".to_string());
        }
        Ok(())
    }

    pub fn executor(&self) -> AnyExecutor {
        match self.distribution_strategy {
            DistributionStrategy::Sequential => AnyExecutor::Sequential(SequentialExecutor),
            DistributionStrategy::Parallel => AnyExecutor::Parallel(match self.jobs {
                Some(workers) => ParallelExecutor::new(workers),
                None => ParallelExecutor::default(),
            }),
        }
    }

    /// Build the export request, filling the bounding box and name from the
    /// dataset manifest when they were not given
    pub async fn into_request(self) -> Result<ExportRequest> {
        let properties = DatasetProperties::from_json(&self.source_path).await?;
        let bounding_box = match self.bbox {
            Some(bbox) => bbox,
            None => properties
                .layer(&self.layer_name)
                .ok_or_else(|| DatasetError::UnknownLayer(self.layer_name.clone()))?
                .bounding_box
                .in_mag(&self.mag),
        };
        let name = self.name.unwrap_or_else(|| properties.id.name.clone());

        Ok(ExportRequest {
            dataset_path: self.source_path,
            layer_name: self.layer_name,
            bounding_box,
            mag: self.mag,
            destination: self.destination_path,
            name,
            axis: self.axis,
            tiling: self.tiling.map(|Tiling(tiling)| tiling),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{LayerProperties, ResolutionProperties};
    use crate::types::{Category, DataFormat};
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> std::result::Result<ExportArgs, clap::Error> {
        let mut argv = vec!["wk-export-tiff", "-s", "/data/ds", "-d", "/out"];
        argv.extend_from_slice(args);
        ExportArgs::try_parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.layer_name, "color");
        assert_eq!(args.axis, Axis::Z);
        assert_eq!(args.mag, Mag::ONE);
        assert_eq!(args.tiling, None);
        assert_eq!(args.bbox, None);
        assert!(!args.verbose);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let args = parse(&[
            "-l",
            "segmentation",
            "-n",
            "stack",
            "-a",
            "x",
            "-t",
            "64,32",
            "-b",
            "0,0,0,10,20,30",
            "-m",
            "2-2-1",
            "-v",
            "--distribution-strategy",
            "sequential",
        ])
        .unwrap();
        assert_eq!(args.layer_name, "segmentation");
        assert_eq!(args.name.as_deref(), Some("stack"));
        assert_eq!(args.axis, Axis::X);
        assert_eq!(args.tiling, Some(Tiling([64, 32])));
        assert_eq!(args.bbox, Some(BoundingBox::new([0, 0, 0], [10, 20, 30])));
        assert_eq!(args.mag.factors(), [2, 2, 1]);
        assert!(args.verbose);
        assert!(matches!(args.executor(), AnyExecutor::Sequential(_)));
    }

    #[test]
    fn test_rejected_values() {
        assert!(parse(&["-a", "w"]).is_err());
        assert!(parse(&["-b", "1,2,3"]).is_err());
        let past_the_end = format!("0,{},0,1,1,1", usize::MAX);
        assert!(parse(&["-b", &past_the_end]).is_err());
        assert!(parse(&["-t", "64"]).is_err());
        assert!(parse(&["-m", "3"]).is_err());

        let mut args = parse(&["-j", "4"]).unwrap();
        assert!(matches!(args.executor(), AnyExecutor::Parallel(p) if p.workers() == 4));
        args.jobs = Some(0);
        assert!(args.validate().unwrap_err().contains("jobs"));
    }

    #[tokio::test]
    async fn test_request_defaults_from_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let layer = LayerProperties {
            name: "color".to_string(),
            category: Category::Color,
            bounding_box: BoundingBox::new([4, 4, 0], [12, 8, 6]),
            element_class: "uint8".to_string(),
            num_channels: 1,
            data_format: DataFormat::Wkw,
            wkw_resolutions: vec![ResolutionProperties {
                mag: Mag::ONE,
                path: "1".to_string(),
                cube_length: Some(32),
            }],
            tiff: None,
            largest_segment_id: None,
        };
        DatasetProperties::new("my_dataset", [1.0; 3], DataFormat::Wkw, None)
            .with_layer(layer)
            .unwrap()
            .export_as_json(temp_dir.path())
            .await
            .unwrap();

        let source = temp_dir.path().to_str().unwrap();
        let args = ExportArgs::try_parse_from([
            "wk-export-tiff",
            "-s",
            source,
            "-d",
            "/out",
            "-m",
            "2",
        ])
        .unwrap();
        let request = args.into_request().await.unwrap();
        assert_eq!(request.name, "my_dataset");
        assert_eq!(request.bounding_box, BoundingBox::new([2, 2, 0], [6, 4, 3]));

        let args = ExportArgs::try_parse_from([
            "wk-export-tiff",
            "-s",
            source,
            "-d",
            "/out",
            "-l",
            "missing",
        ])
        .unwrap();
        assert!(matches!(
            args.into_request().await,
            Err(DatasetError::UnknownLayer(_))
        ));
    }
}
