//! Remote conversion-service seam.
//!
//! [`ConversionService`] is the minimum surface the job driver needs: format
//! discovery, job submission, status polling, result download and
//! cancellation. [`ZamzarClient`] talks to the Zamzar REST API;
//! [`ScriptedService`] replays a fixed script in-process.

pub mod scripted;
pub mod zamzar;

pub use scripted::{ScriptedService, ServiceCall};
pub use zamzar::ZamzarClient;

use crate::error::RelayError;
use crate::output::ConversionJob;
use async_trait::async_trait;

#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Names of every format `source_ext` can be converted into.
    ///
    /// An unknown source format yields an empty list, not an error.
    async fn target_formats(&self, source_ext: &str) -> Result<Vec<String>, RelayError>;

    /// Upload `bytes` as `file_name` and start converting it to `target_ext`.
    async fn submit_job(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        target_ext: &str,
    ) -> Result<ConversionJob, RelayError>;

    /// Current state of a job. The returned artifact list replaces any earlier one.
    async fn job_status(&self, job_id: u64) -> Result<ConversionJob, RelayError>;

    /// Content of one result file.
    async fn fetch_artifact(&self, artifact_id: u64) -> Result<Vec<u8>, RelayError>;

    /// Cancel a job that is still running.
    async fn cancel_job(&self, job_id: u64) -> Result<(), RelayError>;
}
