//! Error types for the dropbox-file-converter library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`RelayError`] — returned as `Err(..)` from storage, service, and
//!   pipeline calls. Configuration variants are fatal at startup; every other
//!   variant is fatal only to the file currently being processed.
//!
//! * [`FailureReason`] — the **recorded** reason a file was routed to the
//!   unconvertible folder. Stored inside [`crate::output::FileOutcome`] so
//!   callers can report what happened without holding on to the error value.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the dropbox-file-converter library.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Transport errors ──────────────────────────────────────────────────
    /// The request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("{service} request '{operation}' failed: {detail}")]
    Transport {
        service: &'static str,
        operation: String,
        detail: String,
    },

    /// The remote answered with a non-success HTTP status.
    #[error("{service} request '{operation}' returned HTTP {status}: {body}")]
    Http {
        service: &'static str,
        operation: String,
        status: u16,
        body: String,
    },

    /// Credentials were rejected (401/403).
    #[error("{service} rejected the configured credentials: {detail}\nCheck the access key in the config file.")]
    Unauthorized {
        service: &'static str,
        detail: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("{service} returned a malformed response for '{operation}': {detail}")]
    MalformedResponse {
        service: &'static str,
        operation: String,
        detail: String,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The storage backend refused an operation on a path (not found, conflict).
    #[error("storage {operation} failed for '{path}': {detail}")]
    Storage {
        operation: &'static str,
        path: String,
        detail: String,
    },

    // ── Conversion outcomes ───────────────────────────────────────────────
    /// The service cannot convert `source` into `target`.
    #[error("cannot convert '{source_ext}' files to '{target}': target format not offered")]
    CapabilityNotFound { source_ext: String, target: String },

    /// The remote job reached the terminal `failed` status.
    #[error("conversion job {job_id} failed")]
    ConversionFailed { job_id: u64 },

    /// The remote job succeeded but listed no result files.
    #[error("conversion job {job_id} finished without producing any files")]
    NoArtifacts { job_id: u64 },

    /// Polling exceeded the configured wait bound without a terminal status.
    #[error("conversion job {job_id} did not finish within {waited_secs}s (last status: {last_status})")]
    PollTimeout {
        job_id: u64,
        waited_secs: u64,
        last_status: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The configuration file does not exist.
    #[error("Config file not found: '{path}'\nCreate it next to the binary or pass --config <PATH>.")]
    ConfigNotFound { path: PathBuf },

    /// The configuration file is not valid JSON or has wrongly typed fields.
    #[error("Config file '{path}' is not valid: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    /// One or more required keys are absent or empty.
    #[error("Config file is missing required keys: {}", keys.join(", "))]
    MissingConfigKeys { keys: Vec<&'static str> },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// True for failures of the network or of the remote's payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RelayError::Transport { .. }
                | RelayError::Http { .. }
                | RelayError::Unauthorized { .. }
                | RelayError::MalformedResponse { .. }
        )
    }

    /// True for errors that must stop the process before the watch loop starts.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            RelayError::ConfigNotFound { .. }
                | RelayError::ConfigParse { .. }
                | RelayError::MissingConfigKeys { .. }
                | RelayError::InvalidConfig(_)
                | RelayError::Unauthorized { .. }
        )
    }

    pub(crate) fn transport(
        service: &'static str,
        operation: impl Into<String>,
        err: reqwest::Error,
    ) -> Self {
        RelayError::Transport {
            service,
            operation: operation.into(),
            detail: err.to_string(),
        }
    }

    pub(crate) fn malformed(
        service: &'static str,
        operation: impl Into<String>,
        detail: impl ToString,
    ) -> Self {
        RelayError::MalformedResponse {
            service,
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn storage(
        operation: &'static str,
        path: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        RelayError::Storage {
            operation,
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Why a file ended up in the unconvertible folder.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// No target format configured for the source extension.
    #[error("no conversion configured for extension '{0}'")]
    NotConfigured(String),

    /// The service does not offer the configured target format.
    #[error("target format not offered by the conversion service")]
    CapabilityNotFound,

    /// The remote job reported `failed`.
    #[error("conversion failed for unknown reason")]
    ConversionFailed,

    /// The remote job succeeded with an empty result list.
    #[error("conversion produced no files")]
    NoArtifacts,

    /// Polling gave up.
    #[error("conversion did not finish in time")]
    PollTimeout,

    /// A network or storage call failed mid-conversion.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<&RelayError> for FailureReason {
    fn from(err: &RelayError) -> Self {
        match err {
            RelayError::CapabilityNotFound { .. } => FailureReason::CapabilityNotFound,
            RelayError::ConversionFailed { .. } => FailureReason::ConversionFailed,
            RelayError::NoArtifacts { .. } => FailureReason::NoArtifacts,
            RelayError::PollTimeout { .. } => FailureReason::PollTimeout,
            other => FailureReason::Transport(other.to_string()),
        }
    }
}
