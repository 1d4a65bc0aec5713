//! Progress-callback trait for per-stage watcher events.
//!
//! Inject an [`Arc<dyn WatchProgressCallback>`] via
//! [`crate::config::WatchConfigBuilder::progress_callback`] to receive events
//! as the orchestrator moves a file through scan, conversion and placement.
//! The library itself only logs through `tracing`; anything resembling a
//! console display lives behind this trait.
//!
//! # Example
//!
//! ```rust
//! use dropbox_file_converter::{WatchConfig, WatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct IdleCounter {
//!     idle: AtomicUsize,
//! }
//!
//! impl WatchProgressCallback for IdleCounter {
//!     fn on_idle(&self) {
//!         self.idle.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(IdleCounter { idle: AtomicUsize::new(0) });
//! let config = WatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn WatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{FileOutcome, JobStatus};
use std::sync::Arc;

/// Called by the orchestrator at each stage of a cycle.
///
/// All methods default to no-ops so implementations only override what they
/// display. Events for one cycle are always delivered from a single task, in
/// order, ending with [`on_cycle_end`](Self::on_cycle_end).
pub trait WatchProgressCallback: Send + Sync {
    /// A cycle started; the inbox is about to be listed.
    fn on_scan_start(&self) {}

    /// The inbox held no files.
    fn on_idle(&self) {}

    /// A file was picked up.
    ///
    /// # Arguments
    /// * `source_path` — full storage path of the file
    /// * `extension`   — parsed (possibly compound) extension
    fn on_file_found(&self, source_path: &str, extension: &str) {
        let _ = (source_path, extension);
    }

    /// The file was submitted and the service assigned `job_id`.
    fn on_job_submitted(&self, job_id: u64, target_extension: &str) {
        let _ = (job_id, target_extension);
    }

    /// A status poll returned.
    fn on_job_status(&self, job_id: u64, status: &JobStatus) {
        let _ = (job_id, status);
    }

    /// Result file `index` (0-based) of `total` was downloaded.
    fn on_artifact_fetched(&self, index: usize, total: usize, bytes: usize) {
        let _ = (index, total, bytes);
    }

    /// The file reached its final location (or stayed put).
    fn on_file_complete(&self, outcome: &FileOutcome) {
        let _ = outcome;
    }

    /// The cycle ended; transient display state can be cleared.
    fn on_cycle_end(&self) {}
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl WatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::WatchConfig`].
pub type ProgressCallback = Arc<dyn WatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Disposition, PlacementOutcome};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        scans: AtomicUsize,
        statuses: AtomicUsize,
        fetched: AtomicUsize,
        ends: AtomicUsize,
    }

    impl WatchProgressCallback for TrackingCallback {
        fn on_scan_start(&self) {
            self.scans.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_status(&self, _job_id: u64, _status: &JobStatus) {
            self.statuses.fetch_add(1, Ordering::SeqCst);
        }

        fn on_artifact_fetched(&self, _index: usize, _total: usize, bytes: usize) {
            self.fetched.fetch_add(bytes, Ordering::SeqCst);
        }

        fn on_cycle_end(&self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_scan_start();
        cb.on_idle();
        cb.on_file_found("/To Convert/a.docx", "docx");
        cb.on_job_submitted(1, "pdf");
        cb.on_job_status(1, &JobStatus::Processing);
        cb.on_artifact_fetched(0, 1, 10);
        cb.on_file_complete(&FileOutcome {
            source_path: "/To Convert/a.docx".into(),
            disposition: Disposition::Unchanged,
            placement: PlacementOutcome::default(),
        });
        cb.on_cycle_end();
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_scan_start();
        tracker.on_job_status(9, &JobStatus::Queued);
        tracker.on_job_status(9, &JobStatus::Successful);
        tracker.on_artifact_fetched(0, 2, 100);
        tracker.on_artifact_fetched(1, 2, 50);
        tracker.on_cycle_end();

        assert_eq!(tracker.scans.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.statuses.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.fetched.load(Ordering::SeqCst), 150);
        assert_eq!(tracker.ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_scan_start();
        cb.on_idle();
        cb.on_cycle_end();
    }
}
