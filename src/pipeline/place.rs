//! Placement of results and originals into the output folders.
//!
//! Every write is preceded by a check-then-delete of whatever already sits at
//! the destination name, so re-running a placement converges to the same
//! folder state instead of failing on a conflict. The original is deleted
//! only after all converted bytes were uploaded.

use crate::config::{FolderLayout, SameFormatPolicy};
use crate::error::RelayError;
use crate::output::{ConversionRequest, PlacementOutcome};
use crate::pipeline::naming::SourceName;
use crate::pipeline::retrieve::RetrievedArtifact;
use crate::storage::{join_path, split_path, RemoteStorage};
use tracing::{debug, info, warn};

/// Decides destination paths and performs the storage calls.
pub struct PlacementRouter<'a> {
    storage: &'a dyn RemoteStorage,
    folders: &'a FolderLayout,
}

impl<'a> PlacementRouter<'a> {
    pub fn new(storage: &'a dyn RemoteStorage, folders: &'a FolderLayout) -> Self {
        Self { storage, folders }
    }

    /// Create `path` unless its parent already lists it. Returns `true` if created.
    pub async fn ensure_folder(&self, path: &str) -> Result<bool, RelayError> {
        let (parent, name) = split_path(path);
        let exists = self
            .storage
            .list_folder(parent)
            .await?
            .iter()
            .any(|e| e.name == name && e.is_folder());
        if exists {
            return Ok(false);
        }
        self.storage.create_folder(path).await?;
        info!("Created folder '{}'", path);
        Ok(true)
    }

    /// Delete the entry `name` in `folder` if the listing contains it.
    ///
    /// Returns `true` if something was deleted. Files and folders are both
    /// matched: whatever occupies the name is in the way of the next write.
    pub async fn delete_if_exists(&self, folder: &str, name: &str) -> Result<bool, RelayError> {
        let entries = self.storage.list_folder(folder).await?;
        let Some(existing) = entries.iter().find(|e| e.name == name) else {
            return Ok(false);
        };
        info!(
            "{}: {} already exists in '{}' folder and will be overwritten",
            if existing.is_folder() { "Folder" } else { "File" },
            name,
            folder
        );
        self.storage.delete(&join_path(folder, name)).await?;
        Ok(true)
    }

    /// Upload converted results and delete the original.
    ///
    /// One result goes to `{converted}/{name}.{ext}`; several go into a fresh
    /// `{converted}/{name}/` folder as `{name}{i}.{ext}` with a zero-based `i`.
    /// If any step fails after the first write, whatever was written is
    /// removed again before the error is returned.
    pub async fn place_converted(
        &self,
        request: &ConversionRequest,
        artifacts: Vec<RetrievedArtifact>,
    ) -> Result<PlacementOutcome, RelayError> {
        let converted = self.folders.converted.as_str();

        let mut written = None;
        let uploaded = self.upload_results(request, artifacts, &mut written).await;
        let placed = match uploaded {
            Ok(paths) => self.storage.delete(&request.source_path).await.map(|()| paths),
            Err(e) => Err(e),
        };
        let destination_paths = match placed {
            Ok(paths) => paths,
            Err(e) => {
                if let Some(path) = written {
                    self.discard(&path).await;
                }
                return Err(e);
            }
        };

        info!(
            "File has been converted successfully and placed in the '{}' folder",
            converted
        );
        Ok(PlacementOutcome {
            converted: true,
            destination_paths,
        })
    }

    /// Write the results. `written` is set to the file or folder that has to
    /// go if placement does not complete.
    async fn upload_results(
        &self,
        request: &ConversionRequest,
        artifacts: Vec<RetrievedArtifact>,
        written: &mut Option<String>,
    ) -> Result<Vec<String>, RelayError> {
        let name = &request.file_base_name;
        let ext = &request.target_extension;
        let converted = self.folders.converted.as_str();

        match artifacts.len() {
            0 => Err(RelayError::Internal(format!(
                "no results to place for '{}'",
                request.source_path
            ))),
            1 => {
                let file_name = format!("{name}.{ext}");
                let path = join_path(converted, &file_name);
                self.delete_if_exists(converted, &file_name).await?;
                let bytes = artifacts.into_iter().map(|a| a.bytes).next().unwrap_or_default();
                self.storage.upload(&path, bytes, true).await?;
                *written = Some(path.clone());
                debug!("Uploaded '{}'", path);
                Ok(vec![path])
            }
            n => {
                let folder = join_path(converted, name);
                self.delete_if_exists(converted, name).await?;
                self.storage.create_folder(&folder).await?;
                *written = Some(folder.clone());

                let mut paths = Vec::with_capacity(n);
                for (i, artifact) in artifacts.into_iter().enumerate() {
                    let path = join_path(&folder, &format!("{name}{i}.{ext}"));
                    self.storage.upload(&path, artifact.bytes, true).await?;
                    info!("Uploaded file {}/{} to '{}'", i + 1, n, path);
                    paths.push(path);
                }
                Ok(paths)
            }
        }
    }

    /// Best-effort removal of a partial result.
    async fn discard(&self, path: &str) {
        match self.storage.delete(path).await {
            Ok(()) => info!("Removed incomplete result '{}'", path),
            Err(e) => warn!("Could not remove incomplete result '{}': {}", path, e),
        }
    }

    /// Move the original into the unconvertible folder, replacing any
    /// earlier file of the same name.
    pub async fn place_unconvertible(
        &self,
        source_path: &str,
        source: &SourceName,
    ) -> Result<PlacementOutcome, RelayError> {
        let folder = self.folders.unconvertible.as_str();
        let file_name = source.file_name.clone();
        let destination = join_path(folder, &file_name);

        self.delete_if_exists(folder, &file_name).await?;
        self.storage.move_entry(source_path, &destination).await?;
        info!("File has been moved to the '{}' folder", folder);

        Ok(PlacementOutcome {
            converted: false,
            destination_paths: vec![destination],
        })
    }

    /// Handle a file whose configured target equals its source format.
    pub async fn place_unchanged(
        &self,
        source_path: &str,
        source: &SourceName,
        policy: SameFormatPolicy,
    ) -> Result<PlacementOutcome, RelayError> {
        match policy {
            SameFormatPolicy::LeaveInPlace => Ok(PlacementOutcome {
                converted: false,
                destination_paths: vec![source_path.to_string()],
            }),
            SameFormatPolicy::MoveToConverted => {
                let folder = self.folders.converted.as_str();
                let file_name = source.file_name.clone();
                let destination = join_path(folder, &file_name);

                self.delete_if_exists(folder, &file_name).await?;
                self.storage.move_entry(source_path, &destination).await?;
                info!("File moved unchanged to the '{}' folder", folder);

                Ok(PlacementOutcome {
                    converted: true,
                    destination_paths: vec![destination],
                })
            }
        }
    }
}
