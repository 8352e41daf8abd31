//! File logging for conductor.
//!
//! Every CLI call is its own short-lived process, and several of them may
//! report task outcomes against the same workspace at once. They all append
//! to `~/.conductor/conductor.log`; each line carries the writer's pid so
//! interleaved calls can be told apart. The file is rotated to
//! `conductor.log.1` once it grows past [`MAX_LOG_BYTES`].
//!
//! Levels as conductor uses them:
//! - ERROR: a plan document could not be written
//! - WARN: cycles, unknown task ids, replaced or escalated plans
//! - INFO: plan lifecycle (created, closed, archived, reset, migrated)
//! - DEBUG: classifier scores, admitted tasks, ignored transitions
//! - TRACE: raw plan documents as read and written
//!
//! `--debug` or `CONDUCTOR_DEBUG=1` turns on DEBUG, `CONDUCTOR_DEBUG=trace`
//! turns on TRACE. Nothing is written until [`init_with_debug`] runs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

/// Size at which the log is moved aside on startup.
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;

static SINK: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Level requested by a `CONDUCTOR_DEBUG` value, if it requests one.
fn level_from_debug_var(value: &str) -> Option<LogLevel> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "debug" => Some(LogLevel::Debug),
        "2" | "trace" => Some(LogLevel::Trace),
        _ => None,
    }
}

/// Move `path` to `<path>.1` when it is larger than `max_bytes`.
fn rotate_if_large(path: &Path, max_bytes: u64) -> io::Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > max_bytes => {
            let mut rotated = path.as_os_str().to_owned();
            rotated.push(".1");
            fs::rename(path, rotated)
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn open_log(dir: &Path) -> io::Result<File> {
    fs::create_dir_all(dir)?;
    let path = dir.join("conductor.log");
    rotate_if_large(&path, MAX_LOG_BYTES)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// Start logging; `debug` comes from the `--debug` flag.
pub fn init_with_debug(debug: bool) {
    let flag = if debug { LogLevel::Debug } else { LogLevel::Info };
    let level = std::env::var("CONDUCTOR_DEBUG")
        .ok()
        .and_then(|v| level_from_debug_var(&v))
        .map_or(flag, |env| env.max(flag));
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);

    // Logging is best effort: without a home directory we stay silent.
    if let Some(dir) = dirs::home_dir().map(|h| h.join(".conductor")) {
        if let Ok(file) = open_log(&dir) {
            SINK.set(Mutex::new(file)).ok();
        }
    }
}

fn current_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn log_at(level: LogLevel, msg: &str) {
    if level > current_level() {
        return;
    }
    let Some(sink) = SINK.get() else {
        return;
    };
    if let Ok(mut file) = sink.lock() {
        let _ = writeln!(
            file,
            "{} {:<5} [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level.as_str(),
            std::process::id(),
            msg
        );
    }
}

pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

pub fn info(msg: &str) {
    log_at(LogLevel::Info, msg);
}

pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

#[macro_export]
macro_rules! clog {
    ($($arg:tt)*) => {
        $crate::log::info(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Written only with `--debug` or `CONDUCTOR_DEBUG`.
#[macro_export]
macro_rules! clog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
