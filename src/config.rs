//! Configuration types for the inbox watcher.
//!
//! Two layers:
//!
//! * [`ConfigFile`] — the JSON file on disk. Holds credentials plus the
//!   extension mapping and optional tuning knobs. Loaded once at startup;
//!   every problem with it is a fatal [`RelayError`].
//! * [`WatchConfig`] — the runtime knobs the [`crate::Orchestrator`] reads,
//!   built via [`WatchConfigBuilder`]. It carries no secrets, so it can be
//!   logged freely.

use crate::error::RelayError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name the watcher looks for when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "dropbox_file_converter_config.json";

/// Zamzar sandbox endpoint. Production keys need `https://api.zamzar.com/v1/`.
pub const DEFAULT_ZAMZAR_ENDPOINT: &str = "https://sandbox.zamzar.com/v1/";

// ── Extension mapping ────────────────────────────────────────────────────

/// Static source-extension → target-extension table. Keys are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionMap(BTreeMap<String, String>);

impl ConversionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.0.insert(source.into(), target.into());
    }

    /// Target extension configured for `source`, if any.
    pub fn target_for(&self, source: &str) -> Option<&str> {
        self.0.get(source).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for ConversionMap {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, t)| (s.into(), t.into())).collect())
    }
}

// ── Folders ──────────────────────────────────────────────────────────────

/// The three storage folders the watcher works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderLayout {
    /// Watched folder. Default: `/To Convert`.
    pub inbox: String,
    /// Destination for converted results. Default: `/Converted`.
    pub converted: String,
    /// Destination for originals that could not be converted. Default: `/Can't Convert`.
    pub unconvertible: String,
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self {
            inbox: "/To Convert".to_string(),
            converted: "/Converted".to_string(),
            unconvertible: "/Can't Convert".to_string(),
        }
    }
}

impl FolderLayout {
    fn all(&self) -> [&str; 3] {
        [&self.inbox, &self.converted, &self.unconvertible]
    }

    fn validate(&self) -> Result<(), RelayError> {
        for folder in self.all() {
            if !folder.starts_with('/') || folder.len() < 2 || folder.ends_with('/') {
                return Err(RelayError::InvalidConfig(format!(
                    "folder '{folder}' must be an absolute path like '/To Convert'"
                )));
            }
        }
        let [a, b, c] = self.all();
        if a == b || a == c || b == c {
            return Err(RelayError::InvalidConfig(
                "inbox, converted and unconvertible folders must be distinct".into(),
            ));
        }
        Ok(())
    }
}

// ── Polling ──────────────────────────────────────────────────────────────

/// How the job driver waits for a remote job to reach a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the second status query. Default: 500 ms.
    pub initial_interval: Duration,
    /// Cap for the doubling delay. Default: 10 s.
    pub max_interval: Duration,
    /// Total time allowed from submission to terminal status. Default: 15 min.
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(900),
        }
    }
}

impl PollPolicy {
    /// Delay to use after `current`: doubled, capped at `max_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// What to do with a file whose configured target equals its source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameFormatPolicy {
    /// Leave the file in the inbox untouched (default).
    ///
    /// The file will be picked up again on the next scan.
    #[default]
    LeaveInPlace,
    /// Move the file into the converted folder, overwriting any previous copy.
    MoveToConverted,
}

// ── Runtime config ───────────────────────────────────────────────────────

/// Runtime configuration for the [`crate::Orchestrator`].
///
/// # Example
/// ```rust
/// use dropbox_file_converter::{ConversionMap, WatchConfig};
/// use std::time::Duration;
///
/// let config = WatchConfig::builder()
///     .conversions([("docx", "pdf"), ("tar.gz", "zip")].into_iter().collect::<ConversionMap>())
///     .idle_interval(Duration::from_secs(5))
///     .build()
///     .unwrap();
/// assert_eq!(config.conversions.target_for("docx"), Some("pdf"));
/// ```
#[derive(Clone)]
pub struct WatchConfig {
    /// Source → target extension mapping.
    pub conversions: ConversionMap,

    /// Storage folders. Default: `/To Convert`, `/Converted`, `/Can't Convert`.
    pub folders: FolderLayout,

    /// Job polling policy.
    pub poll: PollPolicy,

    /// Sleep between cycles. Default: 3 s.
    pub idle_interval: Duration,

    /// Same-format handling. Default: [`SameFormatPolicy::LeaveInPlace`].
    pub same_format: SameFormatPolicy,

    /// Optional progress callback for per-stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            conversions: ConversionMap::default(),
            folders: FolderLayout::default(),
            poll: PollPolicy::default(),
            idle_interval: Duration::from_secs(3),
            same_format: SameFormatPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchConfig")
            .field("conversions", &self.conversions)
            .field("folders", &self.folders)
            .field("poll", &self.poll)
            .field("idle_interval", &self.idle_interval)
            .field("same_format", &self.same_format)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn WatchProgressCallback>"),
            )
            .finish()
    }
}

impl WatchConfig {
    /// Create a new builder for `WatchConfig`.
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`WatchConfig`].
#[derive(Debug)]
pub struct WatchConfigBuilder {
    config: WatchConfig,
}

impl WatchConfigBuilder {
    pub fn conversions(mut self, map: ConversionMap) -> Self {
        self.config.conversions = map;
        self
    }

    pub fn conversion(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.config.conversions.insert(source, target);
        self
    }

    pub fn folders(mut self, folders: FolderLayout) -> Self {
        self.config.folders = folders;
        self
    }

    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.config.poll = poll;
        self
    }

    pub fn poll_max_wait(mut self, wait: Duration) -> Self {
        self.config.poll.max_wait = wait;
        self
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config.idle_interval = interval;
        self
    }

    pub fn same_format(mut self, policy: SameFormatPolicy) -> Self {
        self.config.same_format = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WatchConfig, RelayError> {
        let c = &self.config;
        c.folders.validate()?;
        if c.poll.initial_interval.is_zero() {
            return Err(RelayError::InvalidConfig(
                "poll initial interval must be > 0".into(),
            ));
        }
        if c.poll.max_interval < c.poll.initial_interval {
            return Err(RelayError::InvalidConfig(format!(
                "poll max interval ({:?}) is shorter than the initial interval ({:?})",
                c.poll.max_interval, c.poll.initial_interval
            )));
        }
        Ok(self.config)
    }
}

// ── Config file ──────────────────────────────────────────────────────────

/// On-disk JSON configuration.
///
/// ```json
/// {
///   "access_key": "sl.xxxxx",
///   "zamzar_api_key": "xxxxx",
///   "conversions": { "docx": "pdf", "tar.gz": "zip" }
/// }
/// ```
#[derive(Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Storage bearer token.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub zamzar_api_key: Option<String>,
    /// Only used by the interactive OAuth flow, which this crate does not run.
    #[serde(default)]
    pub dropbox_api_key: Option<String>,
    #[serde(default)]
    pub dropbox_api_secret: Option<String>,
    #[serde(default)]
    pub conversions: Option<ConversionMap>,

    #[serde(default)]
    pub zamzar_endpoint: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub idle_interval_secs: Option<u64>,
    #[serde(default)]
    pub poll_initial_interval_ms: Option<u64>,
    #[serde(default)]
    pub poll_max_interval_ms: Option<u64>,
    #[serde(default)]
    pub poll_max_wait_secs: Option<u64>,
    #[serde(default)]
    pub same_format: Option<SameFormatPolicy>,
    #[serde(default)]
    pub folders: Option<FolderLayout>,
}

impl fmt::Debug for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigFile")
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("zamzar_api_key", &self.zamzar_api_key.as_ref().map(|_| "<redacted>"))
            .field("conversions", &self.conversions)
            .field("zamzar_endpoint", &self.zamzar_endpoint)
            .field("folders", &self.folders)
            .finish_non_exhaustive()
    }
}

/// Credentials and endpoints extracted from a validated [`ConfigFile`].
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub zamzar_api_key: String,
    pub zamzar_endpoint: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &"<redacted>")
            .field("zamzar_api_key", &"<redacted>")
            .field("zamzar_endpoint", &self.zamzar_endpoint)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ConfigFile {
    /// Read and validate the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::ConfigNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                RelayError::ConfigParse {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                }
            }
        })?;
        Self::parse(&text, path)
    }

    /// Parse and validate config JSON. `origin` is only used in error messages.
    pub fn parse(text: &str, origin: impl Into<PathBuf>) -> Result<Self, RelayError> {
        let file: ConfigFile =
            serde_json::from_str(text).map_err(|e| RelayError::ConfigParse {
                path: origin.into(),
                detail: e.to_string(),
            })?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), RelayError> {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

        let mut missing = Vec::new();
        if blank(&self.access_key) {
            missing.push("access_key");
        }
        if blank(&self.zamzar_api_key) {
            missing.push("zamzar_api_key");
        }
        if self.conversions.is_none() {
            missing.push("conversions");
        }
        if !missing.is_empty() {
            return Err(RelayError::MissingConfigKeys { keys: missing });
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key: self.access_key.clone().unwrap_or_default(),
            zamzar_api_key: self.zamzar_api_key.clone().unwrap_or_default(),
            zamzar_endpoint: self
                .zamzar_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ZAMZAR_ENDPOINT.to_string()),
            request_timeout: Duration::from_secs(self.request_timeout_secs.unwrap_or(120)),
        }
    }

    /// Seed a [`WatchConfigBuilder`] with every knob present in the file.
    pub fn watch_config_builder(&self) -> WatchConfigBuilder {
        let defaults = PollPolicy::default();
        let poll = PollPolicy {
            initial_interval: self
                .poll_initial_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_interval),
            max_interval: self
                .poll_max_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_interval),
            max_wait: self
                .poll_max_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_wait),
        };

        let mut builder = WatchConfig::builder()
            .conversions(self.conversions.clone().unwrap_or_default())
            .folders(self.folders.clone().unwrap_or_default())
            .poll(poll)
            .same_format(self.same_format.unwrap_or_default());
        if let Some(secs) = self.idle_interval_secs {
            builder = builder.idle_interval(Duration::from_secs(secs));
        }
        builder
    }
}
