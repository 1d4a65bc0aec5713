//! Zamzar REST API client.
//!
//! Endpoints used (all relative to the configured base, e.g.
//! `https://sandbox.zamzar.com/v1/`):
//!
//! | Call | Endpoint |
//! |------|----------|
//! | target formats | `GET formats/{ext}` |
//! | submit         | `POST jobs` (multipart: `target_format`, `source_file`) |
//! | status         | `GET jobs/{id}` |
//! | result content | `GET files/{id}/content` |
//! | cancel         | `DELETE jobs/{id}` |
//!
//! Authentication is HTTP Basic with the API key as user and an empty password.

use super::ConversionService;
use crate::error::RelayError;
use crate::output::{ArtifactRef, ConversionJob, JobStatus};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "zamzar";

/// [`ConversionService`] backed by the Zamzar API.
#[derive(Clone)]
pub struct ZamzarClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for ZamzarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZamzarClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct FormatResponse {
    #[serde(default)]
    targets: Vec<FormatTarget>,
}

#[derive(Deserialize)]
struct FormatTarget {
    name: String,
}

#[derive(Deserialize)]
struct JobResponse {
    id: u64,
    status: String,
    #[serde(default)]
    target_format: Option<String>,
    #[serde(default)]
    target_files: Vec<TargetFile>,
}

#[derive(Deserialize)]
struct TargetFile {
    id: u64,
}

impl JobResponse {
    fn into_job(self, fallback_target: &str) -> ConversionJob {
        let status = JobStatus::parse(&self.status);
        let target = self
            .target_format
            .unwrap_or_else(|| fallback_target.to_string());
        // Result files are only meaningful once the job has succeeded.
        let artifacts = if status == JobStatus::Successful {
            self.target_files
                .into_iter()
                .map(|f| ArtifactRef {
                    artifact_id: f.id,
                    target_extension: target.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };
        ConversionJob {
            job_id: self.id,
            status,
            artifacts,
        }
    }
}

impl ZamzarClient {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {e}")))?;

        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RelayError> {
        debug!(operation, "Zamzar request");
        let response = request
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| RelayError::transport(SERVICE, operation, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RelayError::Unauthorized {
                service: SERVICE,
                detail: body,
            });
        }
        Err(RelayError::Http {
            service: SERVICE,
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn job(&self, operation: &str, response: reqwest::Response) -> Result<JobResponse, RelayError> {
        response
            .json::<JobResponse>()
            .await
            .map_err(|e| RelayError::malformed(SERVICE, operation, e))
    }
}

#[async_trait]
impl ConversionService for ZamzarClient {
    async fn target_formats(&self, source_ext: &str) -> Result<Vec<String>, RelayError> {
        let operation = format!("formats/{source_ext}");
        let result = self.send(&operation, self.client.get(self.url(&operation))).await;
        let response = match result {
            Ok(r) => r,
            // Unknown source formats are reported as 404.
            Err(RelayError::Http { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let formats: FormatResponse = response
            .json()
            .await
            .map_err(|e| RelayError::malformed(SERVICE, &operation, e))?;
        Ok(formats.targets.into_iter().map(|t| t.name).collect())
    }

    async fn submit_job(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        target_ext: &str,
    ) -> Result<ConversionJob, RelayError> {
        let operation = "jobs";
        let form = Form::new()
            .text("target_format", target_ext.to_string())
            .part("source_file", Part::bytes(bytes).file_name(file_name.to_string()));
        let response = self
            .send(operation, self.client.post(self.url(operation)).multipart(form))
            .await?;
        Ok(self.job(operation, response).await?.into_job(target_ext))
    }

    async fn job_status(&self, job_id: u64) -> Result<ConversionJob, RelayError> {
        let operation = format!("jobs/{job_id}");
        let response = self.send(&operation, self.client.get(self.url(&operation))).await?;
        Ok(self.job(&operation, response).await?.into_job(""))
    }

    async fn fetch_artifact(&self, artifact_id: u64) -> Result<Vec<u8>, RelayError> {
        let operation = format!("files/{artifact_id}/content");
        let response = self.send(&operation, self.client.get(self.url(&operation))).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::transport(SERVICE, operation, e))?;
        Ok(bytes.to_vec())
    }

    async fn cancel_job(&self, job_id: u64) -> Result<(), RelayError> {
        let operation = format!("jobs/{job_id}");
        self.send(&operation, self.client.delete(self.url(&operation))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_job_lists_artifacts_with_target_format() {
        let raw = r#"{
            "id": 15,
            "key": "abc",
            "status": "successful",
            "sandbox": true,
            "target_files": [ {"id": 3, "name": "report-0.png", "size": 10},
                              {"id": 4, "name": "report-1.png", "size": 12} ],
            "target_format": "png",
            "credit_cost": 1
        }"#;
        let job: JobResponse = serde_json::from_str(raw).unwrap();
        let job = job.into_job("jpg");
        assert_eq!(job.job_id, 15);
        assert_eq!(job.status, JobStatus::Successful);
        assert_eq!(
            job.artifacts,
            vec![
                ArtifactRef { artifact_id: 3, target_extension: "png".into() },
                ArtifactRef { artifact_id: 4, target_extension: "png".into() },
            ]
        );
    }

    #[test]
    fn pending_job_has_no_artifacts() {
        let raw = r#"{ "id": 16, "status": "converting", "target_files": [ {"id": 9} ] }"#;
        let job: JobResponse = serde_json::from_str(raw).unwrap();
        let job = job.into_job("pdf");
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.artifacts.is_empty());
    }

    #[test]
    fn format_response_parses() {
        let raw = r#"{ "name": "docx", "targets": [ {"name": "pdf", "credit_cost": 1},
                                                   {"name": "txt", "credit_cost": 1} ] }"#;
        let formats: FormatResponse = serde_json::from_str(raw).unwrap();
        let names: Vec<_> = formats.targets.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["pdf", "txt"]);
    }

    #[test]
    fn endpoint_gets_trailing_slash() {
        let c = ZamzarClient::new("key", "https://api.zamzar.com/v1", Duration::from_secs(5)).unwrap();
        assert_eq!(c.url("jobs/1"), "https://api.zamzar.com/v1/jobs/1");
        assert!(!format!("{c:?}").contains("key"));
    }
}
