use crate::config::app_data_dir;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_NAME: &str = "background-utils.log";

const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const LOG_ARCHIVES: usize = 5;

/// Active log file, also what the tray's "View Log" opens.
pub fn log_file_path() -> PathBuf {
    app_data_dir().join(LOG_FILE_NAME)
}

/// Install the console + file subscriber.
///
/// `RUST_LOG` wins over `level`. Returns `false` when a subscriber was
/// already installed, in which case nothing changes. A file sink that
/// cannot be opened leaves console logging in place.
pub fn init(level: &str, log_file: Option<&Path>) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)));

    let (file, file_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_thread_names(true)
            .with_writer(Mutex::new(file))
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_names(true))
        .with(file_layer)
        .try_init()
        .is_ok();

    if let (true, Some(e)) = (installed, file_error) {
        warn!("File logging disabled: {}", e);
    }
    installed
}

fn directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rotate_if_needed(path, MAX_LOG_BYTES, LOG_ARCHIVES)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// Shift `log`, `log.1` … `log.{keep-1}` up by one once `log` exceeds `max_bytes`.
fn rotate_if_needed(path: &Path, max_bytes: u64, keep: usize) -> io::Result<()> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size <= max_bytes || keep == 0 {
        return Ok(());
    }

    let oldest = archive_path(path, keep);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for index in (1..keep).rev() {
        let from = archive_path(path, index);
        if from.exists() {
            std::fs::rename(&from, archive_path(path, index + 1))?;
        }
    }
    std::fs::rename(path, archive_path(path, 1))
}

fn archive_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
