//! Kernel-style leveled print macros
//!
//! Thread-safe, level-gated debug output in the style of the Linux
//! kernel's `printk`, without pulling in a logging framework dependency.
//!
//! # Environment Variables
//!
//! - `DSTPOOL_LOG_LEVEL=<level>` - off|error|warn|info|debug|trace (or 0-5)
//! - `DSTPOOL_FLUSH_LOG=1` - flush stderr after every print
//!
//! # Usage
//!
//! ```ignore
//! use dstpool_core::{kdebug, kinfo, kwarn, kerror};
//!
//! kinfo!("pool started with {} workers", n);
//! kwarn!("queue {} saturated, producer blocking", qid);
//! ```

use crate::env::env_get_bool;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels, most to least severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn from_str_or_digit(v: &str) -> Self {
        match v.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }

    /// ANSI color code, used only on unix when stderr looks like a tty.
    fn ansi(self) -> &'static str {
        match self {
            LogLevel::Error => "\x1b[31m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Debug | LogLevel::Trace => "\x1b[2m",
            LogLevel::Info | LogLevel::Off => "",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    FLUSH_ENABLED.store(env_get_bool("DSTPOOL_FLUSH_LOG", false), Ordering::Relaxed);
    if let Ok(val) = std::env::var("DSTPOOL_LOG_LEVEL") {
        LOG_LEVEL.store(LogLevel::from_str_or_digit(&val) as u8, Ordering::Relaxed);
    }
}

/// Set the log level programmatically (used by `DispatchConfig`).
pub fn set_log_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn level_enabled(level: LogLevel) -> bool {
    init();
    (level as u8) <= LOG_LEVEL.load(Ordering::Relaxed)
}

#[inline]
fn flush_enabled() -> bool {
    init();
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

fn use_color() -> bool {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            !env_get_bool("DSTPOOL_NO_COLOR", false)
        } else {
            false
        }
    }
}

/// Internal: leveled print with thread id context. Not part of the public
/// API; use the `kerror!`/`kwarn!`/`kinfo!`/`kdebug!`/`ktrace!` macros.
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();

    if use_color() {
        let _ = write!(handle, "{}{}\x1b[0m ", level.ansi(), level.prefix());
    } else {
        let _ = write!(handle, "{} ", level.prefix());
    }
    let _ = write!(handle, "[{:?}] ", std::thread::current().id());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");

    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Error level log.
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log.
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Trace, format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn macros_compile_and_respect_off() {
        set_log_level(LogLevel::Off);
        kerror!("won't print");
        kwarn!("won't print {}", 1);
        kinfo!("won't print");
        kdebug!("won't print");
        ktrace!("won't print");
    }
}
