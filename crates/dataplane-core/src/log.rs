//! Kernel-style leveled diagnostic macros.
//!
//! Not `log`/`tracing` — a small, dependency-free set of macros in the
//! teacher's own idiom (`gvthread_core::kprint`), writing to stderr with an
//! optional timestamp and the current worker-thread id as a tag. Level and
//! behavior are controlled entirely by environment variables since there is
//! no config loader in this workspace.

use std::cell::Cell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::env::{env_get, env_get_bool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Off,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "off" => Self::Off,
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(()),
        })
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(u8::MAX);
static FLUSH: OnceLock<bool> = OnceLock::new();
static SHOW_TIME: OnceLock<bool> = OnceLock::new();

thread_local! {
    static WORKER_ID: Cell<Option<u32>> = Cell::new(None);
}

/// Tag subsequent log lines on this thread with `worker <id>`. Called by the
/// worker pool's poll loop on thread startup.
pub fn set_current_worker_id(id: u32) {
    WORKER_ID.with(|w| w.set(Some(id)));
}

pub fn current_worker_id() -> Option<u32> {
    WORKER_ID.with(|w| w.get())
}

fn level() -> LogLevel {
    let cached = LEVEL.load(Ordering::Relaxed);
    if cached != u8::MAX {
        return LogLevel::from_u8(cached);
    }
    let resolved = env_get::<LogLevel>("DATAPLANE_LOG_LEVEL", LogLevel::Info);
    LEVEL.store(resolved as u8, Ordering::Relaxed);
    resolved
}

fn should_flush() -> bool {
    *FLUSH.get_or_init(|| env_get_bool("DATAPLANE_FLUSH_EPRINT", false))
}

fn show_time() -> bool {
    *SHOW_TIME.get_or_init(|| env_get_bool("DATAPLANE_LOG_TIME", false))
}

#[doc(hidden)]
pub fn __log(lvl: LogLevel, args: std::fmt::Arguments<'_>) {
    if lvl > level() {
        return;
    }
    use std::io::Write;
    let mut stderr = std::io::stderr();
    let tag = match current_worker_id() {
        Some(id) => format!("[w{id}]"),
        None => String::new(),
    };
    if show_time() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let _ = write!(stderr, "[{:>10}.{:06}]", now.as_secs(), now.subsec_micros());
    }
    let _ = writeln!(stderr, "{tag} {args}");
    if should_flush() {
        let _ = stderr.flush();
    }
}

#[macro_export]
macro_rules! derror {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dwarn {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dinfo {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! ddebug {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dtrace {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_roundtrips_from_str() {
        use std::str::FromStr;
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert!(LogLevel::from_str("nonsense").is_err());
    }

    #[test]
    fn worker_id_tag_is_thread_local() {
        assert_eq!(current_worker_id(), None);
        set_current_worker_id(7);
        assert_eq!(current_worker_id(), Some(7));
    }
}
