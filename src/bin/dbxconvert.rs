//! CLI binary for dropbox-file-converter.
//!
//! A thin shim over the library crate that loads the JSON config file,
//! connects both remote services and runs the watch loop.

use anyhow::{Context, Result};
use clap::Parser;
use dropbox_file_converter::{
    ConfigFile, CycleOutcome, Disposition, DropboxStorage, FileOutcome, JobStatus, Orchestrator,
    ProgressCallback, SameFormatPolicy, WatchProgressCallback, WatchStats, ZamzarClient,
    DEFAULT_CONFIG_FILE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal display: one spinner per cycle, cleared when the cycle ends, and
/// a permanent line for every file that was resolved.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn spinner() -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(mut guard) = self.bar.lock() {
            f(guard.get_or_insert_with(Self::spinner));
        }
    }
}

impl WatchProgressCallback for CliProgressCallback {
    fn on_scan_start(&self) {
        self.with_bar(|bar| {
            bar.set_prefix("Scanning");
            bar.set_message("Searching for files to convert…");
        });
    }

    fn on_idle(&self) {
        self.with_bar(|bar| {
            bar.set_prefix("Idle");
            bar.set_message("No files found to convert");
        });
    }

    fn on_file_found(&self, source_path: &str, extension: &str) {
        self.with_bar(|bar| {
            bar.println(format!(
                "{} {}  {}",
                cyan("◆"),
                bold(source_path),
                dim(&format!("[{}]", if extension.is_empty() { "-" } else { extension })),
            ));
            bar.set_prefix("Preparing");
            bar.set_message("Downloading…");
        });
    }

    fn on_job_submitted(&self, job_id: u64, target_extension: &str) {
        self.with_bar(|bar| {
            bar.set_prefix("Converting");
            bar.set_message(format!("job {job_id} → {target_extension}"));
        });
    }

    fn on_job_status(&self, job_id: u64, status: &JobStatus) {
        self.with_bar(|bar| bar.set_message(format!("job {job_id}: {status}")));
    }

    fn on_artifact_fetched(&self, index: usize, total: usize, bytes: usize) {
        self.with_bar(|bar| {
            bar.set_prefix("Fetching");
            bar.set_message(format!("file {}/{}  {}", index + 1, total, dim(&format!("{bytes} bytes"))));
        });
    }

    fn on_file_complete(&self, outcome: &FileOutcome) {
        let line = match &outcome.disposition {
            Disposition::Converted { artifact_count, .. } => format!(
                "  {} converted into {} {}  →  {}",
                green("✓"),
                artifact_count,
                if *artifact_count == 1 { "file" } else { "files" },
                outcome.placement.destination_paths.join(", "),
            ),
            Disposition::Unchanged => format!(
                "  {} already in target format, {}",
                green("✓"),
                if outcome.placement.converted { "moved" } else { "left in place" },
            ),
            Disposition::Unconvertible { reason } => format!(
                "  {} {}  →  {}",
                red("✗"),
                red(&reason.to_string()),
                outcome.placement.destination_paths.join(", "),
            ),
            Disposition::Stranded { detail } => {
                format!("  {} could not be moved: {}", red("✘"), red(detail))
            }
        };
        self.with_bar(|bar| bar.println(line));
    }

    fn on_cycle_end(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Watch the inbox until Ctrl-C
  dbxconvert

  # Use a config file elsewhere
  dbxconvert --config ~/dbx/config.json

  # Process at most one file, print the result as JSON
  dbxconvert --once --json

  # Production Zamzar endpoint, 30 minute job bound
  dbxconvert --endpoint https://api.zamzar.com/v1/ --poll-max-wait 1800

CONFIG FILE (JSON):
  {
    "access_key":     "<dropbox access token>",
    "zamzar_api_key": "<zamzar api key>",
    "conversions":    { "docx": "pdf", "tar.gz": "zip", "pdf": "png" }
  }

  Optional keys: zamzar_endpoint, idle_interval_secs, poll_initial_interval_ms,
  poll_max_interval_ms, poll_max_wait_secs, request_timeout_secs,
  same_format ("leave_in_place" | "move_to_converted"),
  folders { inbox, converted, unconvertible }.

FOLDERS:
  /To Convert       watched inbox
  /Converted        converted results (one file, or a folder of files)
  /Can't Convert    originals that could not be converted

ENVIRONMENT VARIABLES:
  DBXCONVERT_CONFIG     Path to the config file
  DBXCONVERT_ENDPOINT   Zamzar API endpoint
  RUST_LOG              Override log filter (e.g. dropbox_file_converter=debug)
"#;

/// Convert files dropped into a Dropbox folder.
#[derive(Parser, Debug)]
#[command(
    name = "dbxconvert",
    version,
    about = "Convert files dropped into a Dropbox folder",
    long_about = "Watch the '/To Convert' Dropbox folder and convert every file placed there \
through the Zamzar conversion service. Results go to '/Converted'; files that cannot be \
converted are moved to '/Can't Convert'.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, env = "DBXCONVERT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Process at most one file, then exit.
    #[arg(long)]
    once: bool,

    /// Zamzar API endpoint (overrides the config file).
    #[arg(long, env = "DBXCONVERT_ENDPOINT")]
    endpoint: Option<String>,

    /// Seconds to sleep between inbox scans.
    #[arg(long, env = "DBXCONVERT_IDLE_SECS")]
    idle_secs: Option<u64>,

    /// Give up on a conversion job after this many seconds.
    #[arg(long, env = "DBXCONVERT_POLL_MAX_WAIT")]
    poll_max_wait: Option<u64>,

    /// What to do with files already in their target format.
    #[arg(long, value_enum)]
    same_format: Option<SameFormatArg>,

    /// Output the cycle outcome (with --once) or session tally as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DBXCONVERT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DBXCONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DBXCONVERT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SameFormatArg {
    LeaveInPlace,
    MoveToConverted,
}

impl From<SameFormatArg> for SameFormatPolicy {
    fn from(v: SameFormatArg) -> Self {
        match v {
            SameFormatArg::LeaveInPlace => SameFormatPolicy::LeaveInPlace,
            SameFormatArg::MoveToConverted => SameFormatPolicy::MoveToConverted,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries user feedback, so library INFO logs are muted
    // while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Load config ──────────────────────────────────────────────────────
    let file = ConfigFile::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let mut creds = file.credentials();
    if let Some(ref endpoint) = cli.endpoint {
        creds.zamzar_endpoint = endpoint.clone();
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn WatchProgressCallback>)
    } else {
        None
    };

    let mut builder = file.watch_config_builder();
    if let Some(secs) = cli.idle_secs {
        builder = builder.idle_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.poll_max_wait {
        builder = builder.poll_max_wait(Duration::from_secs(secs));
    }
    if let Some(policy) = cli.same_format {
        builder = builder.same_format(policy.into());
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Connect ──────────────────────────────────────────────────────────
    let storage = DropboxStorage::connect(&creds.access_key, creds.request_timeout)
        .await
        .context("Could not connect to Dropbox")?;
    let service = ZamzarClient::new(
        &creds.zamzar_api_key,
        &creds.zamzar_endpoint,
        creds.request_timeout,
    )
    .context("Could not create the Zamzar client")?;

    if !cli.quiet {
        eprintln!(
            "{} Watching {} ({} conversions configured)",
            cyan("◆"),
            bold(&config.folders.inbox),
            config.conversions.len(),
        );
    }

    let orchestrator = Orchestrator::new(Arc::new(storage), Arc::new(service), config);
    orchestrator
        .prepare()
        .await
        .context("Failed to create the Dropbox folders")?;

    // ── Single cycle ─────────────────────────────────────────────────────
    if cli.once {
        let outcome = orchestrator
            .run_once()
            .await
            .context("Failed to scan the inbox")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
            );
        } else if !cli.quiet && matches!(outcome, CycleOutcome::Idle) {
            eprintln!("{}", dim("No files found to convert"));
        }
        return Ok(());
    }

    // ── Watch loop ───────────────────────────────────────────────────────
    // Register the signal handler up front; a lazily polled ctrl_c future
    // would leave the default SIGINT behaviour in place during a cycle.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(());
        }
    });

    let stats = orchestrator
        .run_until(async {
            let _ = stop_rx.await;
        })
        .await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        print_summary(&stats);
    }

    Ok(())
}

fn print_summary(stats: &WatchStats) {
    eprintln!(
        "{}  {} files in {} cycles",
        if stats.unconvertible + stats.stranded == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&stats.files_processed().to_string()),
        stats.cycles,
    );
    eprintln!(
        "   {} converted  /  {} unchanged  /  {} can't convert  /  {} stranded",
        dim(&stats.converted.to_string()),
        dim(&stats.unchanged.to_string()),
        dim(&stats.unconvertible.to_string()),
        dim(&stats.stranded.to_string()),
    );
    if stats.failed_scans > 0 {
        eprintln!("   {} inbox scans failed", red(&stats.failed_scans.to_string()));
    }
}
