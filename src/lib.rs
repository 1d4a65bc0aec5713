//! # dropbox-file-converter
//!
//! Watch a cloud-storage inbox folder and convert every file dropped into it
//! through a remote conversion service.
//!
//! ## How it works
//!
//! Each file found in `/To Convert` is looked up in a static extension
//! mapping (`docx → pdf`, `tar.gz → zip`, ...), uploaded to the conversion
//! service, polled until the job finishes, and the results are written to
//! `/Converted`. Files that cannot be converted (no mapping, target format
//! not offered, job failed, timeout, network error) are moved to
//! `/Can't Convert` instead, so the inbox always drains.
//!
//! ## Pipeline Overview
//!
//! ```text
//! /To Convert/report.docx
//!  │
//!  ├─ 1. Scan        first file in the inbox listing
//!  ├─ 2. Name        base name + (compound) extension
//!  ├─ 3. Map         configured target, or straight to Can't Convert
//!  ├─ 4. Gate        does the service offer docx → pdf?
//!  ├─ 5. Job         submit, then poll with backoff until successful/failed
//!  ├─ 6. Retrieve    download every result file (all-or-nothing)
//!  └─ 7. Place       /Converted/report.pdf  or  /Converted/report/report{i}.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dropbox_file_converter::{ConfigFile, DropboxStorage, Orchestrator, ZamzarClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = ConfigFile::load("dropbox_file_converter_config.json")?;
//!     let creds = file.credentials();
//!
//!     let storage = DropboxStorage::connect(&creds.access_key, creds.request_timeout).await?;
//!     let service = ZamzarClient::new(&creds.zamzar_api_key, &creds.zamzar_endpoint, creds.request_timeout)?;
//!
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(storage),
//!         Arc::new(service),
//!         file.watch_config_builder().build()?,
//!     );
//!     orchestrator.prepare().await?;
//!     let stats = orchestrator.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     eprintln!("{} files processed", stats.files_processed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dbxconvert` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! dropbox-file-converter = { version = "0.2", default-features = false }
//! ```
//!
//! ## Testing without a network
//!
//! [`MemoryStorage`] and [`ScriptedService`] implement the two collaborator
//! traits in-process, so the whole cycle can be driven from a unit test.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConfigFile, ConversionMap, Credentials, FolderLayout, PollPolicy, SameFormatPolicy,
    WatchConfig, WatchConfigBuilder, DEFAULT_CONFIG_FILE, DEFAULT_ZAMZAR_ENDPOINT,
};
pub use error::{FailureReason, RelayError};
pub use orchestrator::Orchestrator;
pub use output::{
    ArtifactRef, ConversionJob, ConversionRequest, CycleOutcome, Disposition, FileOutcome,
    JobStatus, PlacementOutcome, WatchStats,
};
pub use progress::{NoopProgressCallback, ProgressCallback, WatchProgressCallback};
pub use service::{ConversionService, ScriptedService, ServiceCall, ZamzarClient};
pub use storage::{DropboxStorage, Entry, EntryKind, MemoryStorage, RemoteStorage};
