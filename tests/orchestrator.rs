//! Full-cycle tests against the in-process storage and conversion backends.
//!
//! Every test seeds a [`MemoryStorage`], scripts a [`ScriptedService`], runs
//! one or more cycles and then inspects the folder tree, the storage
//! operation log and the service call log.

use async_trait::async_trait;
use dropbox_file_converter::{
    CycleOutcome, Disposition, Entry, FailureReason, FileOutcome, JobStatus, MemoryStorage,
    Orchestrator, PollPolicy, RelayError, RemoteStorage, SameFormatPolicy, ScriptedService,
    ServiceCall, WatchConfig, WatchConfigBuilder, WatchProgressCallback,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route `RUST_LOG` output through the test harness; repeat calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_poll() -> PollPolicy {
    PollPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(4),
        max_wait: Duration::from_secs(5),
    }
}

fn base_config() -> WatchConfigBuilder {
    WatchConfig::builder()
        .conversion("docx", "pdf")
        .conversion("pdf", "png")
        .conversion("png", "png")
        .conversion("tar.gz", "zip")
        .poll(fast_poll())
        .idle_interval(Duration::from_millis(1))
}

struct Harness {
    storage: Arc<MemoryStorage>,
    service: Arc<ScriptedService>,
    orchestrator: Orchestrator,
}

impl Harness {
    async fn new(service: ScriptedService, config: WatchConfigBuilder) -> Self {
        init_tracing();
        let storage = Arc::new(MemoryStorage::new());
        let service = Arc::new(service);
        let orchestrator =
            Orchestrator::new(storage.clone(), service.clone(), config.build().unwrap());
        orchestrator.prepare().await.unwrap();
        storage.clear_operations();
        Self {
            storage,
            service,
            orchestrator,
        }
    }

    fn drop_file(&self, name: &str, bytes: &[u8]) {
        self.storage
            .put_file(&format!("/To Convert/{name}"), bytes.to_vec())
            .unwrap();
    }

    async fn cycle(&self) -> FileOutcome {
        match self.orchestrator.run_once().await.unwrap() {
            CycleOutcome::Processed(outcome) => outcome,
            CycleOutcome::Idle => panic!("expected a file to be processed"),
        }
    }
}

fn converting(job_artifacts: &[u64]) -> ScriptedService {
    ScriptedService::new()
        .with_targets("docx", &["pdf", "txt"])
        .with_targets("pdf", &["png", "jpg"])
        .with_targets("tar.gz", &["zip"])
        .with_poll(JobStatus::Queued, &[])
        .with_poll(JobStatus::Processing, &[])
        .with_poll(JobStatus::Successful, job_artifacts)
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, e: String) {
        self.events.lock().unwrap().push(e);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl WatchProgressCallback for Recorder {
    fn on_scan_start(&self) {
        self.push("scan".into());
    }
    fn on_idle(&self) {
        self.push("idle".into());
    }
    fn on_file_found(&self, source_path: &str, extension: &str) {
        self.push(format!("found {source_path} [{extension}]"));
    }
    fn on_job_submitted(&self, job_id: u64, target_extension: &str) {
        self.push(format!("submitted {job_id} -> {target_extension}"));
    }
    fn on_artifact_fetched(&self, index: usize, total: usize, _bytes: usize) {
        self.push(format!("fetched {}/{}", index + 1, total));
    }
    fn on_file_complete(&self, outcome: &FileOutcome) {
        self.push(format!("complete success={}", outcome.is_success()));
    }
    fn on_cycle_end(&self) {
        self.push("end".into());
    }
}

// ── Idle ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_inbox_is_idle_without_calls() {
    let h = Harness::new(converting(&[1]), base_config()).await;
    h.storage.put_folder("/To Convert/nested").unwrap();

    let outcome = h.orchestrator.run_once().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Idle);
    assert!(h.service.calls().is_empty());
    assert!(h.storage.operations().is_empty());
}

#[tokio::test]
async fn test_missing_inbox_is_a_cycle_error() {
    let storage = Arc::new(MemoryStorage::new());
    let orchestrator = Orchestrator::new(
        storage,
        Arc::new(ScriptedService::new()),
        base_config().build().unwrap(),
    );
    assert!(orchestrator.run_once().await.is_err());
}

// ── Unmapped and same-format files ───────────────────────────────────────────

#[tokio::test]
async fn test_unmapped_extension_skips_the_service() {
    let h = Harness::new(converting(&[1]), base_config()).await;
    h.drop_file("data.xyz", b"raw");

    let outcome = h.cycle().await;

    assert_eq!(
        outcome.disposition,
        Disposition::Unconvertible {
            reason: FailureReason::NotConfigured("xyz".into())
        }
    );
    assert!(h.service.calls().is_empty());
    assert_eq!(h.storage.file("/Can't Convert/data.xyz"), Some(b"raw".to_vec()));
    assert!(!h.storage.exists("/To Convert/data.xyz"));
}

#[tokio::test]
async fn test_name_without_extension_is_unmapped() {
    let h = Harness::new(converting(&[1]), base_config()).await;
    h.drop_file("README", b"text");

    let outcome = h.cycle().await;

    assert_eq!(
        outcome.placement.destination_paths,
        vec!["/Can't Convert/README"]
    );
    assert!(h.service.calls().is_empty());
}

#[tokio::test]
async fn test_same_format_leaves_file_in_place() {
    let h = Harness::new(converting(&[1]), base_config()).await;
    h.drop_file("photo.png", b"png");

    let outcome = h.cycle().await;

    assert_eq!(outcome.disposition, Disposition::Unchanged);
    assert!(outcome.is_success());
    assert!(!outcome.placement.converted);
    assert!(h.service.calls().is_empty());
    assert!(h.storage.operations().is_empty());
    assert!(h.storage.exists("/To Convert/photo.png"));
}

#[tokio::test]
async fn test_same_format_can_move_to_converted() {
    let config = base_config().same_format(SameFormatPolicy::MoveToConverted);
    let h = Harness::new(converting(&[1]), config).await;
    h.storage.put_file("/Converted/photo.png", b"old".to_vec()).unwrap();
    h.drop_file("photo.png", b"new");

    let outcome = h.cycle().await;

    assert_eq!(outcome.disposition, Disposition::Unchanged);
    assert_eq!(h.storage.file("/Converted/photo.png"), Some(b"new".to_vec()));
    assert!(!h.storage.exists("/To Convert/photo.png"));
    assert!(h.service.calls().is_empty());
}

// ── Successful conversions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_single_result_replaces_previous_output() {
    let service = converting(&[7]).with_artifact(7, b"%PDF".to_vec());
    let h = Harness::new(service, base_config()).await;
    h.storage.put_file("/Converted/report.pdf", b"stale".to_vec()).unwrap();
    h.drop_file("report.docx", b"PK");

    let outcome = h.cycle().await;

    assert_eq!(
        outcome.disposition,
        Disposition::Converted {
            job_id: 1,
            artifact_count: 1
        }
    );
    assert_eq!(outcome.placement.destination_paths, vec!["/Converted/report.pdf"]);
    assert_eq!(h.storage.file("/Converted/report.pdf"), Some(b"%PDF".to_vec()));
    assert_eq!(
        h.storage.operations(),
        vec![
            "delete /Converted/report.pdf",
            "upload /Converted/report.pdf",
            "delete /To Convert/report.docx",
        ]
    );
}

#[tokio::test]
async fn test_multiple_results_go_into_a_folder() {
    let service = converting(&[4, 5, 6])
        .with_artifact(4, b"p0".to_vec())
        .with_artifact(5, b"p1".to_vec())
        .with_artifact(6, b"p2".to_vec());
    let h = Harness::new(service, base_config()).await;
    h.drop_file("report.pdf", b"%PDF");

    let outcome = h.cycle().await;

    assert_eq!(
        h.storage.operations(),
        vec![
            "create_folder /Converted/report",
            "upload /Converted/report/report0.png",
            "upload /Converted/report/report1.png",
            "upload /Converted/report/report2.png",
            "delete /To Convert/report.pdf",
        ]
    );
    assert_eq!(outcome.placement.destination_paths.len(), 3);
    assert_eq!(
        h.storage.file("/Converted/report/report1.png"),
        Some(b"p1".to_vec())
    );
}

#[tokio::test]
async fn test_multiple_results_replace_an_existing_folder() {
    let service = converting(&[4, 5])
        .with_artifact(4, b"p0".to_vec())
        .with_artifact(5, b"p1".to_vec());
    let h = Harness::new(service, base_config()).await;
    h.storage
        .put_file("/Converted/report/report9.png", b"old".to_vec())
        .unwrap();
    h.drop_file("report.pdf", b"%PDF");

    h.cycle().await;

    assert_eq!(h.storage.operations()[0], "delete /Converted/report");
    assert!(!h.storage.exists("/Converted/report/report9.png"));
    assert!(h.storage.exists("/Converted/report/report1.png"));
}

#[tokio::test]
async fn test_only_the_final_poll_supplies_results() {
    let service = ScriptedService::new()
        .with_targets("docx", &["pdf"])
        .with_poll(JobStatus::Queued, &[])
        .with_poll(JobStatus::Processing, &[])
        .with_poll(JobStatus::Processing, &[])
        .with_poll(JobStatus::Processing, &[])
        .with_poll(JobStatus::Successful, &[42])
        .with_artifact(42, b"final".to_vec());
    let h = Harness::new(service, base_config()).await;
    h.drop_file("report.docx", b"PK");

    let outcome = h.cycle().await;

    assert_eq!(
        outcome.disposition,
        Disposition::Converted {
            job_id: 1,
            artifact_count: 1
        }
    );
    let calls = h.service.calls();
    let polls = calls
        .iter()
        .filter(|c| matches!(c, ServiceCall::Status(_)))
        .count();
    assert_eq!(polls, 5);
    assert!(calls.contains(&ServiceCall::Fetch(42)));
}

#[tokio::test]
async fn test_compound_extension_round_trip() {
    let service = converting(&[3]).with_artifact(3, b"zip".to_vec());
    let h = Harness::new(service, base_config()).await;
    h.drop_file("backup.tar.gz", b"gz");

    h.cycle().await;

    assert_eq!(h.service.calls()[0], ServiceCall::TargetFormats("tar.gz".into()));
    assert!(h.storage.exists("/Converted/backup.zip"));
    assert!(!h.storage.exists("/To Convert/backup.tar.gz"));
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_capability_routes_to_cant_convert() {
    let service = ScriptedService::new().with_targets("docx", &["txt"]);
    let h = Harness::new(service, base_config()).await;
    h.drop_file("report.docx", b"PK");

    let outcome = h.cycle().await;

    assert_eq!(
        outcome.disposition,
        Disposition::Unconvertible {
            reason: FailureReason::CapabilityNotFound
        }
    );
    assert!(!h
        .service
        .calls()
        .iter()
        .any(|c| matches!(c, ServiceCall::Submit { .. })));
    assert!(h.storage.exists("/Can't Convert/report.docx"));
}

#[tokio::test]
async fn test_failed_job_routes_to_cant_convert() {
    let service = ScriptedService::new()
        .with_targets("docx", &["pdf"])
        .with_poll(JobStatus::Processing, &[])
        .with_poll(JobStatus::Failed, &[]);
    let h = Harness::new(service, base_config()).await;
    h.drop_file("report.docx", b"PK");

    let outcome = h.cycle().await;

    assert_eq!(
        outcome.disposition,
        Disposition::Unconvertible {
            reason: FailureReason::ConversionFailed
        }
    );
    assert_eq!(
        h.storage.file("/Can't Convert/report.docx"),
        Some(b"PK".to_vec())
    );
}

#[tokio::test]
async fn test_failure_placement_twice_converges() {
    let h = Harness::new(ScriptedService::new(), base_config()).await;

    h.drop_file("data.xyz", b"first");
    h.cycle().await;
    let after_first = h.storage.paths();

    h.storage.clear_operations();
    h.drop_file("data.xyz", b"second");
    h.cycle().await;

    assert_eq!(h.storage.paths(), after_first);
    assert_eq!(
        h.storage.file("/Can't Convert/data.xyz"),
        Some(b"second".to_vec())
    );
    assert_eq!(
        h.storage.operations(),
        vec![
            "delete /Can't Convert/data.xyz",
            "move /To Convert/data.xyz -> /Can't Convert/data.xyz",
        ]
    );
}

#[tokio::test]
async fn test_partial_fetch_writes_nothing_to_converted() {
    let service = converting(&[4, 5, 6])
        .with_artifact(4, b"p0".to_vec())
        .with_failing_artifact(5)
        .with_artifact(6, b"p2".to_vec());
    let h = Harness::new(service, base_config()).await;
    h.drop_file("report.pdf", b"%PDF");

    let outcome = h.cycle().await;

    assert!(matches!(
        outcome.disposition,
        Disposition::Unconvertible {
            reason: FailureReason::Transport(_)
        }
    ));
    assert!(!h.storage.paths().iter().any(|p| p.starts_with("/Converted/")));
    assert!(h.storage.exists("/Can't Convert/report.pdf"));
}

#[tokio::test]
async fn test_unreachable_service_routes_to_cant_convert() {
    let h = Harness::new(ScriptedService::new().offline(), base_config()).await;
    h.drop_file("report.docx", b"PK");

    let outcome = h.cycle().await;

    assert!(matches!(
        outcome.disposition,
        Disposition::Unconvertible {
            reason: FailureReason::Transport(_)
        }
    ));
    assert!(h.storage.exists("/Can't Convert/report.docx"));
}

#[tokio::test]
async fn test_stuck_job_times_out_and_is_cancelled() {
    let service = ScriptedService::new()
        .with_targets("docx", &["pdf"])
        .with_poll(JobStatus::Unknown("paused".into()), &[]);
    let config = base_config().poll_max_wait(Duration::from_millis(20));
    let h = Harness::new(service, config).await;
    h.drop_file("report.docx", b"PK");

    let outcome = h.cycle().await;

    assert_eq!(
        outcome.disposition,
        Disposition::Unconvertible {
            reason: FailureReason::PollTimeout
        }
    );
    assert!(h.service.calls().contains(&ServiceCall::Cancel(1)));
}

#[tokio::test]
async fn test_unplaceable_file_stays_in_inbox() {
    // A file where the unconvertible folder should be makes every placement fail.
    let storage = Arc::new(MemoryStorage::new());
    storage.put_folder("/To Convert").unwrap();
    storage.put_folder("/Converted").unwrap();
    storage.put_file("/Can't Convert", b"not a folder".to_vec()).unwrap();
    storage.put_file("/To Convert/data.xyz", b"raw".to_vec()).unwrap();
    let orchestrator = Orchestrator::new(
        storage.clone(),
        Arc::new(ScriptedService::new()),
        base_config().build().unwrap(),
    );

    let outcome = orchestrator.run_once().await.unwrap();

    match outcome {
        CycleOutcome::Processed(file) => {
            assert!(matches!(file.disposition, Disposition::Stranded { .. }));
            assert!(!file.is_success());
        }
        CycleOutcome::Idle => panic!("expected the file to be picked up"),
    }
    assert!(storage.exists("/To Convert/data.xyz"));
}

/// Memory storage whose `nth` upload (1-based) fails.
struct FlakyUploads {
    inner: Arc<MemoryStorage>,
    nth: usize,
    uploads: AtomicUsize,
}

#[async_trait]
impl RemoteStorage for FlakyUploads {
    async fn list_folder(&self, path: &str) -> Result<Vec<Entry>, RelayError> {
        self.inner.list_folder(path).await
    }
    async fn download(&self, path: &str) -> Result<Vec<u8>, RelayError> {
        self.inner.download(path).await
    }
    async fn upload(&self, path: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), RelayError> {
        if self.uploads.fetch_add(1, Ordering::SeqCst) + 1 == self.nth {
            return Err(RelayError::Storage {
                operation: "upload",
                path: path.to_string(),
                detail: "connection dropped".into(),
            });
        }
        self.inner.upload(path, bytes, overwrite).await
    }
    async fn move_entry(&self, from: &str, to: &str) -> Result<(), RelayError> {
        self.inner.move_entry(from, to).await
    }
    async fn delete(&self, path: &str) -> Result<(), RelayError> {
        self.inner.delete(path).await
    }
    async fn create_folder(&self, path: &str) -> Result<(), RelayError> {
        self.inner.create_folder(path).await
    }
}

#[tokio::test]
async fn test_interrupted_multi_upload_leaves_no_partial_output() {
    init_tracing();
    let memory = Arc::new(MemoryStorage::new());
    let storage = Arc::new(FlakyUploads {
        inner: memory.clone(),
        nth: 2,
        uploads: AtomicUsize::new(0),
    });
    let service = converting(&[4, 5, 6])
        .with_artifact(4, b"p0".to_vec())
        .with_artifact(5, b"p1".to_vec())
        .with_artifact(6, b"p2".to_vec());
    let orchestrator =
        Orchestrator::new(storage, Arc::new(service), base_config().build().unwrap());
    orchestrator.prepare().await.unwrap();
    memory.put_file("/To Convert/report.pdf", b"%PDF".to_vec()).unwrap();

    let outcome = orchestrator.run_once().await.unwrap();

    let CycleOutcome::Processed(file) = outcome else {
        panic!("expected the file to be picked up");
    };
    assert!(matches!(file.disposition, Disposition::Unconvertible { .. }));
    assert!(!memory.paths().iter().any(|p| p.starts_with("/Converted/")));
    assert!(memory.exists("/Can't Convert/report.pdf"));
    assert!(!memory.exists("/To Convert/report.pdf"));
}

// ── Progress events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_progress_events_follow_the_cycle() {
    let recorder = Arc::new(Recorder::default());
    let service = converting(&[8, 9])
        .with_artifact(8, b"a".to_vec())
        .with_artifact(9, b"b".to_vec());
    let config = base_config().progress_callback(recorder.clone() as Arc<dyn WatchProgressCallback>);
    let h = Harness::new(service, config).await;

    h.orchestrator.run_once().await.unwrap();
    h.drop_file("report.pdf", b"%PDF");
    h.orchestrator.run_once().await.unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            "scan",
            "idle",
            "end",
            "scan",
            "found /To Convert/report.pdf [pdf]",
            "submitted 1 -> png",
            "fetched 1/2",
            "fetched 2/2",
            "complete success=true",
            "end",
        ]
    );
}

#[tokio::test]
async fn test_files_are_processed_one_per_cycle_in_listing_order() {
    let service = ScriptedService::new();
    let h = Harness::new(service, base_config()).await;
    h.drop_file("b.xyz", b"b");
    h.drop_file("a.xyz", b"a");

    assert_eq!(h.cycle().await.source_path, "/To Convert/b.xyz");
    assert!(h.storage.exists("/To Convert/a.xyz"));
    assert_eq!(h.cycle().await.source_path, "/To Convert/a.xyz");
    assert_eq!(h.orchestrator.run_once().await.unwrap(), CycleOutcome::Idle);
}
