//! Values produced while processing a single inbox file.
//!
//! Nothing here outlives one orchestration cycle: a [`ConversionRequest`] is
//! created when a file is discovered, a [`ConversionJob`] while the remote
//! service works on it, and the cycle ends by returning a [`CycleOutcome`].

use crate::error::FailureReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything needed to submit one file for conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Full storage path of the source, e.g. `/To Convert/report.docx`.
    pub source_path: String,
    /// Raw bytes downloaded from storage.
    pub source_bytes: Vec<u8>,
    /// Last path segment without its extension, e.g. `report`.
    pub file_base_name: String,
    pub source_extension: String,
    pub target_extension: String,
}

impl ConversionRequest {
    /// File name sent to the service alongside the bytes.
    pub fn upload_name(&self) -> String {
        format!("{}.{}", self.file_base_name, self.source_extension)
    }
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("source_path", &self.source_path)
            .field("source_bytes", &format_args!("<{} bytes>", self.source_bytes.len()))
            .field("file_base_name", &self.file_base_name)
            .field("source_extension", &self.source_extension)
            .field("target_extension", &self.target_extension)
            .finish()
    }
}

/// Lifecycle state reported by the conversion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Successful,
    Failed,
    /// Any status string the driver does not recognise. Non-terminal.
    Unknown(String),
}

impl JobStatus {
    /// Map a raw service status string.
    ///
    /// `cancelled` is folded into [`JobStatus::Failed`]: a cancelled job never
    /// produces files, so waiting on it would only run into the poll bound.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" | "initialising" | "uploading" => JobStatus::Queued,
            "processing" | "converting" => JobStatus::Processing,
            "successful" => JobStatus::Successful,
            "failed" | "cancelled" => JobStatus::Failed,
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => f.write_str("queued"),
            JobStatus::Processing => f.write_str("processing"),
            JobStatus::Successful => f.write_str("successful"),
            JobStatus::Failed => f.write_str("failed"),
            JobStatus::Unknown(s) => write!(f, "unknown ({s})"),
        }
    }
}

/// One result file of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_id: u64,
    pub target_extension: String,
}

/// A remote job as last observed by the driver.
///
/// `status` and `artifacts` are replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub job_id: u64,
    pub status: JobStatus,
    pub artifacts: Vec<ArtifactRef>,
}

/// Where a file (or its converted artifacts) ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementOutcome {
    pub converted: bool,
    pub destination_paths: Vec<String>,
}

/// What happened to the file picked up in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    /// Converted and uploaded; the source was deleted.
    Converted { job_id: u64, artifact_count: usize },
    /// Source and target formats are identical; no conversion call was made.
    Unchanged,
    /// Moved to the unconvertible folder.
    Unconvertible { reason: FailureReason },
    /// Placement itself failed; the source is still in the inbox.
    Stranded { detail: String },
}

/// Result of processing one inbox file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source_path: String,
    pub disposition: Disposition,
    pub placement: PlacementOutcome,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self.disposition,
            Disposition::Converted { .. } | Disposition::Unchanged
        )
    }
}

/// Result of one orchestration cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cycle", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The inbox held no files.
    Idle,
    Processed(FileOutcome),
}

/// Running tally over the cycles of a watch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStats {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub failed_scans: u64,
    pub converted: u64,
    pub unchanged: u64,
    pub unconvertible: u64,
    pub stranded: u64,
}

impl WatchStats {
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Idle => self.idle_cycles += 1,
            CycleOutcome::Processed(file) => match file.disposition {
                Disposition::Converted { .. } => self.converted += 1,
                Disposition::Unchanged => self.unchanged += 1,
                Disposition::Unconvertible { .. } => self.unconvertible += 1,
                Disposition::Stranded { .. } => self.stranded += 1,
            },
        }
    }

    pub fn record_scan_failure(&mut self) {
        self.cycles += 1;
        self.failed_scans += 1;
    }

    /// Files that left the inbox (or were deliberately left there) this session.
    pub fn files_processed(&self) -> u64 {
        self.converted + self.unchanged + self.unconvertible + self.stranded
    }
}
