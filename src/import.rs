//! Making a foreign layer directory part of a dataset

use crate::error::{DatasetError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Makes the layer directory `source` available at `target`
#[async_trait]
pub trait LayerImporter: Send + Sync {
    async fn import(&self, source: &Path, target: &Path) -> Result<()>;
}

/// Links the foreign layer directory into the dataset
#[derive(Debug, Clone, Copy, Default)]
pub struct SymlinkImporter;

#[async_trait]
impl LayerImporter for SymlinkImporter {
    async fn import(&self, source: &Path, target: &Path) -> Result<()> {
        debug!("Linking {} -> {}", target.display(), source.display());
        #[cfg(unix)]
        let linked = fs::symlink(source, target).await;
        #[cfg(windows)]
        let linked = fs::symlink_dir(source, target).await;
        linked.map_err(|e| DatasetError::filesystem("Creating layer symlink", target, e))
    }
}

/// Copies the foreign layer directory into the dataset
///
/// For filesystems without symbolic links, and for imports that must
/// outlive the source dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyImporter;

#[async_trait]
impl LayerImporter for CopyImporter {
    async fn import(&self, source: &Path, target: &Path) -> Result<()> {
        if fs::symlink_metadata(target).await.is_ok() {
            return Err(DatasetError::filesystem(
                "Copying layer",
                target,
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }

        let mut pending: Vec<(PathBuf, PathBuf)> = vec![(source.to_path_buf(), target.to_path_buf())];
        let mut files = 0usize;
        while let Some((from, to)) = pending.pop() {
            fs::create_dir_all(&to)
                .await
                .map_err(|e| DatasetError::filesystem("Creating directory", &to, e))?;
            let mut entries = fs::read_dir(&from)
                .await
                .map_err(|e| DatasetError::filesystem("Listing directory", &from, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| DatasetError::filesystem("Listing directory", &from, e))?
            {
                let destination = to.join(entry.file_name());
                // follows links, so linked mags are copied too
                let metadata = fs::metadata(entry.path())
                    .await
                    .map_err(|e| DatasetError::filesystem("Inspecting", entry.path(), e))?;
                if metadata.is_dir() {
                    pending.push((entry.path(), destination));
                } else {
                    fs::copy(entry.path(), &destination)
                        .await
                        .map_err(|e| DatasetError::filesystem("Copying file", &destination, e))?;
                    files += 1;
                }
            }
        }
        debug!("Copied {} file(s) from {} to {}", files, source.display(), target.display());
        Ok(())
    }
}

/// Remove an imported or created layer directory
///
/// Links are removed without touching what they point to.
pub(crate) async fn remove_layer_dir(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DatasetError::filesystem("Inspecting layer", path, e)),
    };
    let removed = if metadata.file_type().is_symlink() {
        #[cfg(windows)]
        let removed = fs::remove_dir(path).await;
        #[cfg(not(windows))]
        let removed = fs::remove_file(path).await;
        removed
    } else {
        fs::remove_dir_all(path).await
    };
    removed.map_err(|e| DatasetError::filesystem("Deleting layer", path, e))
}
