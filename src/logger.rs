//! Session log.
//!
//! One file per run, truncated when the session starts:
//!   Windows:  `%APPDATA%\EditFE\editfe.log`
//!   Linux:    `$XDG_DATA_HOME/EditFE/editfe.log` (`~/.local/share` fallback)
//!   macOS:    `~/Library/Application Support/EditFE/editfe.log`
//!
//! Use `log_info!` / `log_warn!` / `log_err!` anywhere in the crate.  Until
//! [`init`] runs (unit tests, hosts that never opt in) lines go nowhere
//! unless the stderr mirror is on.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

struct Session {
    path: PathBuf,
    file: Mutex<File>,
}

static SESSION: OnceLock<Session> = OnceLock::new();
static MIRROR: AtomicBool = AtomicBool::new(false);

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// Path of the active session log, once [`init`] succeeded.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|s| s.path.as_path())
}

pub fn set_stderr_mirror(enabled: bool) {
    MIRROR.store(enabled, Ordering::Relaxed);
}

/// Write one `[time] [LEVEL] message` line.  I/O errors are swallowed.
pub fn log(level: Level, args: fmt::Arguments<'_>) {
    let line = format!("[{}] [{}] {}", chrono::Local::now().format("%H:%M:%S%.3f"), level.tag(), args);
    emit(&line);
}

fn emit(line: &str) {
    if MIRROR.load(Ordering::Relaxed) {
        eprintln!("{line}");
    }
    if let Some(session) = SESSION.get()
        && let Ok(mut file) = session.file.lock()
    {
        let _ = writeln!(file, "{line}");
    }
}

/// Open the session log at the platform location.  A log that cannot be
/// opened is reported on stderr and the editor carries on without one.
pub fn init(mirror_stderr: bool) {
    if let Err(e) = init_at(&default_log_path(), mirror_stderr) {
        eprintln!("[logger] session log unavailable: {e}");
    }
}

/// Open (truncating) the session log at `path` and hook panics into it.
/// Only the first successful call takes effect.
pub fn init_at(path: &Path, mirror_stderr: bool) -> io::Result<()> {
    set_stderr_mirror(mirror_stderr);
    if SESSION.get().is_some() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let _ = SESSION.set(Session { path: path.to_path_buf(), file: Mutex::new(file) });

    emit(&format!(
        "=== EditFE {} session {} ===",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    emit(&format!("Log file: {}", path.display()));

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log(Level::Panic, format_args!("{info}"));
        previous(info);
    }));
    Ok(())
}

fn default_log_path() -> PathBuf {
    data_dir().join("EditFE").join("editfe.log")
}

fn data_dir() -> PathBuf {
    let env_dir = |key: &str| std::env::var_os(key).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    let dir = env_dir("APPDATA");
    #[cfg(target_os = "macos")]
    let dir = env_dir("HOME").map(|h| h.join("Library").join("Application Support"));
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let dir = env_dir("XDG_DATA_HOME").or_else(|| env_dir("HOME").map(|h| h.join(".local").join("share")));

    dir.unwrap_or_else(|| PathBuf::from("."))
}
