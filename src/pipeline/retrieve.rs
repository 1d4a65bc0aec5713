//! Result-file download.
//!
//! Results are fetched one after another and held in memory until all of
//! them arrived. A single failed download fails the whole batch before
//! anything is written to storage, so the converted folder never receives a
//! partial set.

use crate::error::RelayError;
use crate::output::ArtifactRef;
use crate::progress::ProgressCallback;
use crate::service::ConversionService;
use tracing::{info, warn};

/// A downloaded result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedArtifact {
    pub artifact: ArtifactRef,
    pub bytes: Vec<u8>,
}

/// Download one result file.
pub async fn fetch(
    service: &dyn ConversionService,
    artifact_id: u64,
) -> Result<Vec<u8>, RelayError> {
    service.fetch_artifact(artifact_id).await
}

/// Download every result file in order; all-or-nothing.
pub async fn fetch_all(
    service: &dyn ConversionService,
    artifacts: &[ArtifactRef],
    progress: Option<&ProgressCallback>,
) -> Result<Vec<RetrievedArtifact>, RelayError> {
    let total = artifacts.len();
    let mut fetched = Vec::with_capacity(total);

    for (i, artifact) in artifacts.iter().enumerate() {
        info!("Getting file: {}/{}", i + 1, total);
        let bytes = fetch(service, artifact.artifact_id).await.map_err(|e| {
            warn!(
                "Result file {} of {} failed, discarding {} already fetched: {}",
                i + 1,
                total,
                fetched.len(),
                e
            );
            e
        })?;
        if let Some(cb) = progress {
            cb.on_artifact_fetched(i, total, bytes.len());
        }
        fetched.push(RetrievedArtifact {
            artifact: artifact.clone(),
            bytes,
        });
    }

    Ok(fetched)
}
