//! Conversion job driver: submit, then poll until a terminal status.
//!
//! ## Poll Strategy
//!
//! The first status query is sent immediately after submission. Later
//! queries wait `initial_interval * 2^n`, capped at `max_interval`, so a
//! slow job costs a handful of requests instead of a tight loop. Only
//! `successful` and `failed` end the loop; anything else (including status
//! strings the driver has never seen) keeps it going until `max_wait`
//! elapses, at which point the remote job is cancelled and
//! [`RelayError::PollTimeout`] is returned.

use crate::config::PollPolicy;
use crate::error::RelayError;
use crate::output::{ConversionJob, ConversionRequest, JobStatus};
use crate::progress::ProgressCallback;
use crate::service::ConversionService;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Drives a single remote job from submission to terminal status.
pub struct JobDriver<'a> {
    service: &'a dyn ConversionService,
    policy: PollPolicy,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> JobDriver<'a> {
    pub fn new(service: &'a dyn ConversionService, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<&'a ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Submit the request and wait for the job to finish.
    ///
    /// Returns the job with its final artifact list on `successful`;
    /// `failed` becomes [`RelayError::ConversionFailed`] and a successful job
    /// without result files becomes [`RelayError::NoArtifacts`].
    pub async fn run(&self, request: &ConversionRequest) -> Result<ConversionJob, RelayError> {
        let job = self.submit(request).await?;
        self.wait(job).await
    }

    /// Upload the source bytes with the target format.
    pub async fn submit(&self, request: &ConversionRequest) -> Result<ConversionJob, RelayError> {
        let job = self
            .service
            .submit_job(
                &request.upload_name(),
                request.source_bytes.clone(),
                &request.target_extension,
            )
            .await?;
        info!("File uploaded! Job ID: {}", job.job_id);
        if let Some(cb) = self.progress {
            cb.on_job_submitted(job.job_id, &request.target_extension);
        }
        Ok(job)
    }

    /// Poll `job` until it reaches a terminal status or the wait bound.
    pub async fn wait(&self, mut job: ConversionJob) -> Result<ConversionJob, RelayError> {
        let started = Instant::now();
        let mut interval = self.policy.initial_interval;
        let mut polls = 0u32;

        loop {
            let polled = match self.service.job_status(job.job_id).await {
                Ok(p) => p,
                Err(e) => {
                    self.abandon(job.job_id).await;
                    return Err(e);
                }
            };
            polls += 1;
            job.status = polled.status;
            job.artifacts = polled.artifacts;

            info!("Conversion status: {}", job.status);
            if let Some(cb) = self.progress {
                cb.on_job_status(job.job_id, &job.status);
            }

            if let JobStatus::Unknown(raw) = &job.status {
                warn!("Job {}: unrecognised status '{}', still waiting", job.job_id, raw);
            }

            if job.status.is_terminal() {
                return match job.status {
                    JobStatus::Successful if job.artifacts.is_empty() => {
                        Err(RelayError::NoArtifacts { job_id: job.job_id })
                    }
                    JobStatus::Successful => {
                        let n = job.artifacts.len();
                        info!(
                            "Converted into {} {} after {} polls",
                            n,
                            if n == 1 { "file" } else { "files" },
                            polls
                        );
                        Ok(job)
                    }
                    _ => {
                        info!("Conversion failed for unknown reason");
                        Err(RelayError::ConversionFailed { job_id: job.job_id })
                    }
                };
            }

            let elapsed = started.elapsed();
            if elapsed >= self.policy.max_wait {
                self.abandon(job.job_id).await;
                return Err(RelayError::PollTimeout {
                    job_id: job.job_id,
                    waited_secs: elapsed.as_secs(),
                    last_status: job.status.to_string(),
                });
            }

            let delay = interval.min(self.policy.max_wait - elapsed);
            debug!("Job {}: next poll in {:?}", job.job_id, delay);
            sleep(delay).await;
            interval = self.policy.next_interval(interval);
        }
    }

    /// Best-effort cancellation so a job we stop watching doesn't linger remotely.
    async fn abandon(&self, job_id: u64) {
        match self.service.cancel_job(job_id).await {
            Ok(()) => info!("Cancelled remote job {}", job_id),
            Err(e) => warn!("Could not cancel remote job {}: {}", job_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ArtifactRef;
    use crate::service::{ScriptedService, ServiceCall};
    use std::time::Duration;

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            max_wait: Duration::from_secs(5),
        }
    }

    fn request() -> ConversionRequest {
        ConversionRequest {
            source_path: "/To Convert/report.docx".into(),
            source_bytes: b"PK\x03\x04".to_vec(),
            file_base_name: "report".into(),
            source_extension: "docx".into(),
            target_extension: "pdf".into(),
        }
    }

    #[tokio::test]
    async fn polls_until_successful_and_keeps_only_final_artifacts() {
        let svc = ScriptedService::new()
            .with_poll(JobStatus::Queued, &[])
            .with_poll(JobStatus::Processing, &[])
            .with_poll(JobStatus::Processing, &[])
            .with_poll(JobStatus::Successful, &[11, 12]);

        let job = JobDriver::new(&svc, fast_policy()).run(&request()).await.unwrap();

        assert_eq!(job.status, JobStatus::Successful);
        assert_eq!(
            job.artifacts,
            vec![
                ArtifactRef { artifact_id: 11, target_extension: "pdf".into() },
                ArtifactRef { artifact_id: 12, target_extension: "pdf".into() },
            ]
        );
        let polls = svc
            .calls()
            .iter()
            .filter(|c| matches!(c, ServiceCall::Status(_)))
            .count();
        assert_eq!(polls, 4);
    }

    #[tokio::test]
    async fn submit_sends_name_bytes_and_target() {
        let svc = ScriptedService::new().with_poll(JobStatus::Successful, &[1]);
        JobDriver::new(&svc, fast_policy()).run(&request()).await.unwrap();
        assert_eq!(
            svc.calls()[0],
            ServiceCall::Submit {
                file_name: "report.docx".into(),
                target: "pdf".into(),
                size: 4,
            }
        );
    }

    #[tokio::test]
    async fn failed_status_is_terminal() {
        let svc = ScriptedService::new()
            .with_poll(JobStatus::Processing, &[])
            .with_poll(JobStatus::Failed, &[]);
        let err = JobDriver::new(&svc, fast_policy()).run(&request()).await.unwrap_err();
        assert!(matches!(err, RelayError::ConversionFailed { job_id: 1 }));
        assert!(!svc.calls().iter().any(|c| matches!(c, ServiceCall::Cancel(_))));
    }

    #[tokio::test]
    async fn successful_without_files_is_an_error() {
        let svc = ScriptedService::new().with_poll(JobStatus::Successful, &[]);
        let err = JobDriver::new(&svc, fast_policy()).run(&request()).await.unwrap_err();
        assert!(matches!(err, RelayError::NoArtifacts { .. }));
    }

    #[tokio::test]
    async fn unknown_status_times_out_and_cancels() {
        let svc = ScriptedService::new().with_poll(JobStatus::Unknown("paused".into()), &[]);
        let policy = PollPolicy {
            max_wait: Duration::from_millis(30),
            ..fast_policy()
        };

        let err = JobDriver::new(&svc, policy).run(&request()).await.unwrap_err();

        match err {
            RelayError::PollTimeout { job_id, last_status, .. } => {
                assert_eq!(job_id, 1);
                assert!(last_status.contains("paused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(svc.calls().last(), Some(&ServiceCall::Cancel(1)));
    }

    #[tokio::test]
    async fn backoff_grows_the_gap_between_polls() {
        let svc = ScriptedService::new();
        let policy = PollPolicy {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(40),
            max_wait: Duration::from_millis(120),
        };
        let _ = JobDriver::new(&svc, policy).run(&request()).await;

        // 10 + 20 + 40 + 40 ms of sleep fit in 120 ms; a busy loop would poll far more.
        let polls = svc
            .calls()
            .iter()
            .filter(|c| matches!(c, ServiceCall::Status(_)))
            .count();
        assert!((3..=8).contains(&polls), "polled {polls} times");
    }
}
