//! The watch loop.
//!
//! ## Cycle
//!
//! One cycle picks at most one file from the inbox and resolves it
//! completely before the next scan starts:
//!
//! ```text
//! scan ─▶ none ─────────────────────────────────────────────▶ Idle
//!   │
//!   └▶ file ─▶ ext ─▶ no mapping ────────────────────────────▶ Can't Convert
//!                 ├▶ ext == target ──────────────────────────▶ Unchanged
//!                 └▶ download ─▶ capability ─▶ job ─▶ fetch ─▶ Converted
//!                                   (any error) ─────────────▶ Can't Convert
//! ```
//!
//! Per-file errors never escape a cycle: they become a [`Disposition`] and
//! are logged. Only [`Orchestrator::prepare`] and [`Orchestrator::run_once`]'s
//! scan step return errors to the caller; the long-running loops log those
//! and retry after the idle interval.

use crate::config::WatchConfig;
use crate::error::{FailureReason, RelayError};
use crate::output::{
    ConversionJob, ConversionRequest, CycleOutcome, Disposition, FileOutcome, PlacementOutcome,
    WatchStats,
};
use crate::pipeline::capability::require_capability;
use crate::pipeline::job::JobDriver;
use crate::pipeline::naming::SourceName;
use crate::pipeline::place::PlacementRouter;
use crate::pipeline::retrieve::fetch_all;
use crate::pipeline::scan::scan_inbox;
use crate::progress::ProgressCallback;
use crate::service::ConversionService;
use crate::storage::RemoteStorage;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Watches the inbox and routes every file it finds.
///
/// Storage session and conversion client are injected and reused across
/// cycles; the configuration is read-only once the orchestrator exists.
pub struct Orchestrator {
    storage: Arc<dyn RemoteStorage>,
    service: Arc<dyn ConversionService>,
    config: WatchConfig,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn RemoteStorage>,
        service: Arc<dyn ConversionService>,
        config: WatchConfig,
    ) -> Self {
        Self {
            storage,
            service,
            config,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.config.progress_callback.as_ref()
    }

    fn router(&self) -> PlacementRouter<'_> {
        PlacementRouter::new(self.storage.as_ref(), &self.config.folders)
    }

    /// Create the inbox and both output folders if they are missing.
    ///
    /// Safe to call repeatedly.
    pub async fn prepare(&self) -> Result<(), RelayError> {
        let folders = &self.config.folders;
        let router = self.router();
        for folder in [&folders.inbox, &folders.converted, &folders.unconvertible] {
            router.ensure_folder(folder).await?;
        }
        info!("Watching '{}' for new files", folders.inbox);
        Ok(())
    }

    /// Run a single cycle: scan once and process at most one file.
    ///
    /// # Errors
    /// Only a failed inbox listing is returned; everything after a file was
    /// found is reported through the [`CycleOutcome`].
    pub async fn run_once(&self) -> Result<CycleOutcome, RelayError> {
        let outcome = self.cycle().await;
        if let Some(cb) = self.progress() {
            cb.on_cycle_end();
        }
        outcome
    }

    /// Watch forever.
    pub async fn run(&self) -> WatchStats {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Watch until `shutdown` resolves, then return the session tally.
    ///
    /// Shutdown is honoured between cycles only: a file that is being
    /// converted is always resolved first.
    pub async fn run_until<F>(&self, shutdown: F) -> WatchStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = WatchStats::default();

        loop {
            match self.run_once().await {
                Ok(outcome) => stats.record(&outcome),
                Err(e) => {
                    stats.record_scan_failure();
                    error!("Could not list '{}': {}", self.config.folders.inbox, e);
                }
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping after {} cycles", stats.cycles);
                    return stats;
                }
                _ = sleep(self.config.idle_interval) => {}
            }
        }
    }

    async fn cycle(&self) -> Result<CycleOutcome, RelayError> {
        // ── Step 1: Scan inbox ───────────────────────────────────────────────
        if let Some(cb) = self.progress() {
            cb.on_scan_start();
        }
        debug!("Searching for files to convert");
        let Some(source_path) = scan_inbox(self.storage.as_ref(), &self.config.folders.inbox).await?
        else {
            if let Some(cb) = self.progress() {
                cb.on_idle();
            }
            debug!("No files found to convert");
            return Ok(CycleOutcome::Idle);
        };

        let outcome = self.process(source_path).await;
        if let Some(cb) = self.progress() {
            cb.on_file_complete(&outcome);
        }
        Ok(CycleOutcome::Processed(outcome))
    }

    async fn process(&self, source_path: String) -> FileOutcome {
        let started = Instant::now();

        // ── Step 2: Parse extension ──────────────────────────────────────────
        let name = SourceName::parse(&source_path);
        info!("Found file: {}", source_path);
        if let Some(cb) = self.progress() {
            cb.on_file_found(&source_path, &name.extension);
        }

        // ── Step 3: Look up configured target ────────────────────────────────
        let Some(target) = self.config.conversions.target_for(&name.extension) else {
            info!(
                "No conversion configured for '{}' files, skipping conversion",
                name.extension
            );
            let reason = FailureReason::NotConfigured(name.extension.clone());
            return self.route_failure(source_path, &name, reason).await;
        };

        // ── Step 4: Same format short-circuit ────────────────────────────────
        if target == name.extension {
            info!("File is already in the target format '{}'", target);
            let placed = self
                .router()
                .place_unchanged(&source_path, &name, self.config.same_format)
                .await;
            return match placed {
                Ok(placement) => FileOutcome {
                    source_path,
                    disposition: Disposition::Unchanged,
                    placement,
                },
                Err(e) => self.stranded(source_path, &e),
            };
        }

        // ── Step 5: Convert and place ────────────────────────────────────────
        let converted = self.convert(&source_path, &name, target).await;
        match converted {
            Ok((job, placement)) => {
                info!(
                    "'{}' converted in {}ms (job {})",
                    source_path,
                    started.elapsed().as_millis(),
                    job.job_id
                );
                FileOutcome {
                    source_path,
                    disposition: Disposition::Converted {
                        job_id: job.job_id,
                        artifact_count: job.artifacts.len(),
                    },
                    placement,
                }
            }
            Err(e) => {
                if !matches!(e, RelayError::CapabilityNotFound { .. }) {
                    warn!("Conversion of '{}' failed: {}", source_path, e);
                }
                let reason = FailureReason::from(&e);
                self.route_failure(source_path, &name, reason).await
            }
        }
    }

    async fn convert(
        &self,
        source_path: &str,
        name: &SourceName,
        target: &str,
    ) -> Result<(ConversionJob, PlacementOutcome), RelayError> {
        let service = self.service.as_ref();

        let source_bytes = self.storage.download(source_path).await?;
        debug!("Downloaded {} bytes from '{}'", source_bytes.len(), source_path);
        let request = ConversionRequest {
            source_path: source_path.to_string(),
            source_bytes,
            file_base_name: name.file_base_name.clone(),
            source_extension: name.extension.clone(),
            target_extension: target.to_string(),
        };

        require_capability(service, &request.source_extension, target).await?;

        let job = JobDriver::new(service, self.config.poll)
            .with_progress(self.progress())
            .run(&request)
            .await?;

        let artifacts = fetch_all(service, &job.artifacts, self.progress()).await?;
        let placement = self.router().place_converted(&request, artifacts).await?;
        Ok((job, placement))
    }

    async fn route_failure(
        &self,
        source_path: String,
        name: &SourceName,
        reason: FailureReason,
    ) -> FileOutcome {
        let placed = self.router().place_unconvertible(&source_path, name).await;
        match placed {
            Ok(placement) => FileOutcome {
                source_path,
                disposition: Disposition::Unconvertible { reason },
                placement,
            },
            Err(e) => self.stranded(source_path, &e),
        }
    }

    fn stranded(&self, source_path: String, err: &RelayError) -> FileOutcome {
        error!("Could not place '{}': {}", source_path, err);
        FileOutcome {
            source_path,
            disposition: Disposition::Stranded {
                detail: err.to_string(),
            },
            placement: PlacementOutcome::default(),
        }
    }
}
