//! Deterministic in-process conversion service.
//!
//! Replays a fixed sequence of job statuses and serves preset result bytes,
//! recording every call it receives. Pairs with
//! [`crate::storage::MemoryStorage`] to run the watcher without a network.

use super::ConversionService;
use crate::error::RelayError;
use crate::output::{ArtifactRef, ConversionJob, JobStatus};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// A call received by [`ScriptedService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    TargetFormats(String),
    Submit { file_name: String, target: String, size: usize },
    Status(u64),
    Fetch(u64),
    Cancel(u64),
}

#[derive(Debug, Clone)]
struct PollStep {
    status: JobStatus,
    artifact_ids: Vec<u64>,
}

#[derive(Debug, Default)]
struct Script {
    formats: HashMap<String, Vec<String>>,
    polls: VecDeque<PollStep>,
    last_poll: Option<PollStep>,
    artifacts: BTreeMap<u64, Vec<u8>>,
    failing_artifacts: HashSet<u64>,
    offline: bool,
    next_job_id: u64,
    last_target: String,
    calls: Vec<ServiceCall>,
}

/// Scripted [`ConversionService`].
///
/// Status polls are answered from the queued steps in order; once the queue
/// is drained the last step repeats. With nothing queued every poll answers
/// `processing`.
#[derive(Debug, Default)]
pub struct ScriptedService {
    script: Mutex<Script>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Script>, RelayError> {
        self.script
            .lock()
            .map_err(|_| RelayError::Internal("scripted service lock poisoned".into()))
    }

    /// Declare the formats reachable from `source`.
    pub fn with_targets(self, source: &str, targets: &[&str]) -> Self {
        if let Ok(mut s) = self.lock() {
            s.formats
                .insert(source.to_string(), targets.iter().map(|t| t.to_string()).collect());
        }
        self
    }

    /// Queue a status answer. `artifact_ids` are reported only for `Successful`.
    pub fn with_poll(self, status: JobStatus, artifact_ids: &[u64]) -> Self {
        if let Ok(mut s) = self.lock() {
            s.polls.push_back(PollStep {
                status,
                artifact_ids: artifact_ids.to_vec(),
            });
        }
        self
    }

    /// Serve `bytes` for result file `id`.
    pub fn with_artifact(self, id: u64, bytes: impl Into<Vec<u8>>) -> Self {
        if let Ok(mut s) = self.lock() {
            s.artifacts.insert(id, bytes.into());
        }
        self
    }

    /// Make downloads of result file `id` fail with a transport error.
    pub fn with_failing_artifact(self, id: u64) -> Self {
        if let Ok(mut s) = self.lock() {
            s.failing_artifacts.insert(id);
        }
        self
    }

    /// Make every call fail with a transport error.
    pub fn offline(self) -> Self {
        if let Ok(mut s) = self.lock() {
            s.offline = true;
        }
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    fn unreachable(operation: &str) -> RelayError {
        RelayError::Transport {
            service: "scripted",
            operation: operation.to_string(),
            detail: "connection refused".into(),
        }
    }
}

#[async_trait]
impl ConversionService for ScriptedService {
    async fn target_formats(&self, source_ext: &str) -> Result<Vec<String>, RelayError> {
        let mut s = self.lock()?;
        s.calls.push(ServiceCall::TargetFormats(source_ext.to_string()));
        if s.offline {
            return Err(Self::unreachable("formats"));
        }
        Ok(s.formats.get(source_ext).cloned().unwrap_or_default())
    }

    async fn submit_job(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        target_ext: &str,
    ) -> Result<ConversionJob, RelayError> {
        let mut s = self.lock()?;
        s.calls.push(ServiceCall::Submit {
            file_name: file_name.to_string(),
            target: target_ext.to_string(),
            size: bytes.len(),
        });
        if s.offline {
            return Err(Self::unreachable("jobs"));
        }
        s.next_job_id += 1;
        s.last_target = target_ext.to_string();
        Ok(ConversionJob {
            job_id: s.next_job_id,
            status: JobStatus::Queued,
            artifacts: Vec::new(),
        })
    }

    async fn job_status(&self, job_id: u64) -> Result<ConversionJob, RelayError> {
        let mut s = self.lock()?;
        s.calls.push(ServiceCall::Status(job_id));
        if s.offline {
            return Err(Self::unreachable("jobs/status"));
        }
        let step = match s.polls.pop_front() {
            Some(step) => {
                s.last_poll = Some(step.clone());
                step
            }
            None => s.last_poll.clone().unwrap_or(PollStep {
                status: JobStatus::Processing,
                artifact_ids: Vec::new(),
            }),
        };
        let artifacts = if step.status == JobStatus::Successful {
            step.artifact_ids
                .iter()
                .map(|&artifact_id| ArtifactRef {
                    artifact_id,
                    target_extension: s.last_target.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(ConversionJob {
            job_id,
            status: step.status,
            artifacts,
        })
    }

    async fn fetch_artifact(&self, artifact_id: u64) -> Result<Vec<u8>, RelayError> {
        let mut s = self.lock()?;
        s.calls.push(ServiceCall::Fetch(artifact_id));
        if s.offline || s.failing_artifacts.contains(&artifact_id) {
            return Err(Self::unreachable("files/content"));
        }
        s.artifacts.get(&artifact_id).cloned().ok_or_else(|| RelayError::Http {
            service: "scripted",
            operation: format!("files/{artifact_id}/content"),
            status: 404,
            body: "file not found".into(),
        })
    }

    async fn cancel_job(&self, job_id: u64) -> Result<(), RelayError> {
        let mut s = self.lock()?;
        s.calls.push(ServiceCall::Cancel(job_id));
        if s.offline {
            return Err(Self::unreachable("jobs/cancel"));
        }
        Ok(())
    }
}
