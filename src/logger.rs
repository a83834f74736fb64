//! Session logger: a `log` backend that writes every record to one file in the
//! OS data directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\SheetOverlay\sheetoverlay.log`
//!   Linux:    `~/.local/share/SheetOverlay/sheetoverlay.log`
//!   macOS:    `~/Library/Application Support/SheetOverlay/sheetoverlay.log`
//!
//! Crate code logs through the `log` macros (`log::info!`, `log::warn!`, ...).
//! Panics are mirrored to the file by a hook installed in [`init`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOGGER: SessionLogger = SessionLogger;

struct SessionLogger;

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        write_line(&format!(
            "[{}] [{}] [{}] {}",
            timestamp(),
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {
        if let Some(mutex) = LOG_FILE.get()
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Write a raw line to the session log. I/O errors are ignored so logging
/// never takes the editor down.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Initialise the session logger at the default location.
pub fn init(level: LevelFilter) -> bool {
    init_with_path(&log_file_path(), level)
}

/// Initialise the session logger writing to `path`.
///
/// * Creates (or truncates) the log file.
/// * Registers the `log` backend at `level`.
/// * Installs a panic hook that writes the panic message to the log before
///   propagating to the default handler.
///
/// Returns false when the file could not be opened or a logger was already
/// installed; the editor runs fine without one.
pub fn init_with_path(path: &Path, level: LevelFilter) -> bool {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path);

    match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.to_path_buf());
            if LOG_FILE.set(Mutex::new(f)).is_err() {
                return false;
            }
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return false;
        }
    }

    if log::set_logger(&LOGGER).is_err() {
        return false;
    }
    log::set_max_level(level);

    write_line(&format!("=== SheetOverlay session started {} ===", human_timestamp()));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
    true
}

fn log_file_path() -> PathBuf {
    data_dir().join("SheetOverlay").join("sheetoverlay.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The logger is process-global, so everything is checked in one test.
    #[test]
    fn records_reach_the_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.log");
        assert!(init_with_path(&path, LevelFilter::Debug));
        assert_eq!(log_path(), Some(&path));

        log::info!("first layer decoded");
        log::trace!("too chatty");
        log::logger().flush();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("=== SheetOverlay session started"));
        assert!(text.contains("[INFO]"));
        assert!(text.contains("first layer decoded"));
        assert!(!text.contains("too chatty"));

        // Second init is refused; the first logger stays in place.
        assert!(!init_with_path(&dir.path().join("other.log"), LevelFilter::Info));
    }
}
