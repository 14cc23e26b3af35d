//! Logging setup for the NeuroShift CLI.
//!
//! Events go to `<home>/logs/<app>.log` and to stderr. A CLI run is short, so
//! the log file is rotated once when the run starts, never while writing.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "neuroshift=info,neuroshift_core=info,neuroshift_store=info";
/// Rotated generations kept next to the live file.
const KEPT_LOGS: usize = 4;
const ROTATE_ABOVE: u64 = 10 * 1024 * 1024;

/// Logging options for one binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only.
    pub verbose: bool,
}

/// Install the global subscriber: file at `RUST_LOG` (or the default filter),
/// stderr at warn unless verbose.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = logs_dir();
    let file = open_log(&dir, config.app_name, KEPT_LOGS, ROTATE_ABOVE)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    let console_filter = if config.verbose {
        filter()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(filter()),
        )
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}

/// NeuroShift home directory.
///
/// Priority:
/// 1) NEUROSHIFT_HOME
/// 2) ~/.neuroshift
/// 3) ./.neuroshift
pub fn neuroshift_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("NEUROSHIFT_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".neuroshift")
}

/// Logs directory: <home>/logs
pub fn logs_dir() -> PathBuf {
    neuroshift_home().join("logs")
}

/// Open `<dir>/<app>.log` for appending, rotating it first if it has grown
/// past `rotate_above` bytes.
fn open_log(dir: &Path, app_name: &str, kept: usize, rotate_above: u64) -> io::Result<File> {
    fs::create_dir_all(dir)?;
    let base = sanitize_name(app_name);
    let live = dir.join(format!("{}.log", base));

    let size = fs::metadata(&live).map(|meta| meta.len()).unwrap_or(0);
    if size > rotate_above {
        rotate(dir, &base, kept)?;
    }
    OpenOptions::new().create(true).append(true).open(live)
}

/// `<base>.log` becomes `.log.1`, `.log.1` becomes `.log.2`, and so on; the
/// generation past `kept` is removed.
fn rotate(dir: &Path, base: &str, kept: usize) -> io::Result<()> {
    let live = dir.join(format!("{}.log", base));
    if kept == 0 {
        return remove_if_exists(&live);
    }
    let generation = |n: usize| dir.join(format!("{}.log.{}", base, n));

    remove_if_exists(&generation(kept))?;
    for n in (1..kept).rev() {
        let older = generation(n);
        if older.exists() {
            fs::rename(&older, generation(n + 1))?;
        }
    }
    fs::rename(live, generation(1))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
