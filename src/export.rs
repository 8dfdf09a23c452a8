//! Exporting a layer region as a stack of 2D images
//!
//! The region is cut into one job per slice along the export axis. Jobs are
//! independent: each opens its own read-only handle, reads its slice (or the
//! tiles of it), and writes one image file per plane.

use crate::codec::ImageEncoder;
use crate::error::{DatasetError, Result};
use crate::executor::Executor;
use crate::layout::{Axis, BoundingBox};
use crate::properties::DatasetProperties;
use crate::storage::{StorageEngine, StorageSpec};
use crate::types::Mag;
use crate::utils::format_bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// What to export and where to
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub dataset_path: PathBuf,
    pub layer_name: String,
    /// Region in voxels of `mag`
    pub bounding_box: BoundingBox,
    pub mag: Mag,
    pub destination: PathBuf,
    /// Base name of the image files
    pub name: String,
    pub axis: Axis,
    /// Split every slice into tiles of this size along the two plane axes
    pub tiling: Option<[usize; 2]>,
}

/// One slice of the exported region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceJob {
    pub slice_index: usize,
    pub bounding_box: BoundingBox,
}

/// Files and bytes written by an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub files: usize,
    pub bytes: u64,
}

impl ExportSummary {
    fn merge(self, other: ExportSummary) -> ExportSummary {
        ExportSummary {
            files: self.files + other.files,
            bytes: self.bytes + other.bytes,
        }
    }
}

/// Cut `bbox` into slices of thickness 1 along `axis`
///
/// Slices cover the box without gaps or overlap, in ascending order.
pub fn partition_slices(bbox: &BoundingBox, axis: Axis) -> Result<Vec<SliceJob>> {
    let a = axis.index();
    let num_slices = bbox.size[a];
    if num_slices > 0 && bbox.is_empty() {
        return Err(DatasetError::InvalidBoundingBox(format!(
            "{} has an empty slice plane",
            bbox
        )));
    }

    Ok((0..num_slices)
        .map(|slice_index| {
            let mut topleft = bbox.topleft;
            let mut size = bbox.size;
            topleft[a] += slice_index;
            size[a] = 1;
            SliceJob {
                slice_index,
                bounding_box: BoundingBox::new(topleft, size),
            }
        })
        .collect())
}

/// Cut a slice into tiles of `tiling` along the two plane axes
pub fn tile_boxes(slice: &BoundingBox, axis: Axis, tiling: [usize; 2]) -> Result<Vec<BoundingBox>> {
    if tiling.contains(&0) {
        return Err(DatasetError::InvalidDimensions(format!(
            "tiling {:?} must be positive",
            tiling
        )));
    }
    let [first, second] = axis.plane_axes();
    let end = slice.end();

    let mut tiles = Vec::new();
    for b in (slice.topleft[second]..end[second]).step_by(tiling[1]) {
        for a in (slice.topleft[first]..end[first]).step_by(tiling[0]) {
            let mut tile = *slice;
            tile.topleft[first] = a;
            tile.topleft[second] = b;
            tile.size[first] = tiling[0].min(end[first] - a);
            tile.size[second] = tiling[1].min(end[second] - b);
            tiles.push(tile);
        }
    }
    Ok(tiles)
}

/// `{name}_topleft_{x}_{y}_{z}_size_{w}_{h}_{d}.{extension}`
pub fn slice_file_name(name: &str, bbox: &BoundingBox, extension: &str) -> String {
    let [x, y, z] = bbox.topleft;
    let [w, h, d] = bbox.size;
    format!(
        "{}_topleft_{}_{}_{}_size_{}_{}_{}.{}",
        name, x, y, z, w, h, d, extension
    )
}

/// Shared state of the slice jobs
struct SliceExporter {
    spec: StorageSpec,
    engine: Arc<dyn StorageEngine>,
    encoder: Arc<dyn ImageEncoder>,
    destination: PathBuf,
    name: String,
    axis: Axis,
    tiling: Option<[usize; 2]>,
}

impl SliceExporter {
    async fn export(&self, job: SliceJob) -> Result<ExportSummary> {
        let storage = self.engine.open(&self.spec).await?;
        let planes = match self.tiling {
            Some(tiling) => tile_boxes(&job.bounding_box, self.axis, tiling)?,
            None => vec![job.bounding_box],
        };

        let mut summary = ExportSummary::default();
        for bbox in planes {
            let block = storage.read(bbox.topleft, bbox.size).await?;
            let plane = block.into_plane(self.axis)?;

            let encoder = Arc::clone(&self.encoder);
            let encoded = tokio::task::spawn_blocking(move || encoder.encode(&plane))
                .await
                .map_err(|e| DatasetError::Encode(format!("encoder task failed: {}", e)))??;

            let path = self
                .destination
                .join(slice_file_name(&self.name, &bbox, self.encoder.extension()));
            fs::write(&path, &encoded)
                .await
                .map_err(|e| DatasetError::filesystem("Writing image", &path, e))?;
            summary = summary.merge(ExportSummary {
                files: 1,
                bytes: encoded.len() as u64,
            });
        }
        debug!("Saved slice {} ({} file(s))", job.slice_index, summary.files);
        Ok(summary)
    }
}

/// Export `request.bounding_box` of a layer as images along `request.axis`
///
/// Slices are handed to `executor` as independent jobs; the first failing
/// slice fails the export.
pub async fn export_tiff_stack<E: Executor>(
    request: &ExportRequest,
    engine: Arc<dyn StorageEngine>,
    encoder: Arc<dyn ImageEncoder>,
    executor: &E,
) -> Result<ExportSummary> {
    let jobs = partition_slices(&request.bounding_box, request.axis)?;
    if let Some(tiling) = request.tiling {
        if tiling.contains(&0) {
            return Err(DatasetError::InvalidDimensions(format!(
                "tiling {:?} must be positive",
                tiling
            )));
        }
    }

    let properties = DatasetProperties::from_json(&request.dataset_path).await?;
    let layer = properties
        .layer(&request.layer_name)
        .ok_or_else(|| DatasetError::UnknownLayer(request.layer_name.clone()))?;
    let resolution = layer
        .resolution(&request.mag)
        .ok_or_else(|| DatasetError::UnknownMag {
            layer: request.layer_name.clone(),
            mag: request.mag.to_layer_name(),
        })?;
    let spec = StorageSpec::for_resolution(&request.dataset_path, layer, resolution, true)?;

    fs::create_dir_all(&request.destination)
        .await
        .map_err(|e| DatasetError::filesystem("Creating destination", &request.destination, e))?;

    info!(
        "Exporting {} slice(s) of {} along {} from layer '{}' (mag {}) to {}",
        jobs.len(),
        request.bounding_box,
        request.axis,
        request.layer_name,
        request.mag,
        request.destination.display()
    );

    let exporter = Arc::new(SliceExporter {
        spec,
        engine,
        encoder,
        destination: request.destination.clone(),
        name: request.name.clone(),
        axis: request.axis,
        tiling: request.tiling,
    });
    let summaries = executor
        .map(
            move |job| {
                let exporter = Arc::clone(&exporter);
                async move { exporter.export(job).await }
            },
            jobs,
        )
        .await?;

    let summary = summaries
        .into_iter()
        .fold(ExportSummary::default(), ExportSummary::merge);
    info!(
        "Wrote {} file(s), {}",
        summary.files,
        format_bytes(summary.bytes)
    );
    Ok(summary)
}
