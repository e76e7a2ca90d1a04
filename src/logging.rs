// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel logging
//!
//! Console output goes through a single `core::fmt::Write` sink so the
//! same macros work under the host test harness and under a bare
//! console. This is not the `log` crate's facade: there is no
//! `log::Log` registration, just a small set of macros routed through
//! `log_print`.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels, most to least verbose.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    pub fn as_ansi_color(self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[36m",
            LogLevel::Debug => "\x1b[34m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }

    pub const fn ansi_reset() -> &'static str {
        "\x1b[0m"
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            _ => LogLevel::Fatal,
        }
    }
}

static MIN_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static USE_COLORS: AtomicBool = AtomicBool::new(true);

/// Set the minimum level that will be printed.
pub fn set_min_level(level: LogLevel) {
    MIN_LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn min_level() -> LogLevel {
    LogLevel::from_u8(MIN_LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn set_colors(enabled: bool) {
    USE_COLORS.store(enabled, Ordering::Relaxed);
}

/// Sink the console writes through. Swappable so boot code can
/// install a UART or framebuffer writer before handing off to the
/// rest of the kernel; tests use the default (stdout-backed when
/// compiled with `std`, a sink black hole otherwise).
pub trait ConsoleSink: Sync {
    fn write_str(&self, s: &str);
}

struct NullSink;
impl ConsoleSink for NullSink {
    fn write_str(&self, _s: &str) {}
}

#[cfg(test)]
struct StdoutSink;
#[cfg(test)]
impl ConsoleSink for StdoutSink {
    fn write_str(&self, s: &str) {
        print!("{}", s);
    }
}

#[cfg(not(test))]
static SINK: NullSink = NullSink;
#[cfg(test)]
static SINK: StdoutSink = StdoutSink;

fn print_internal(s: &str) {
    SINK.write_str(s);
}

struct LogWriter;

impl Write for LogWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        print_internal(s);
        Ok(())
    }
}

/// Formats and emits one log line at `level`. Silently dropped if
/// below the current minimum level.
#[inline]
pub fn log_print(level: LogLevel, args: core::fmt::Arguments) {
    if level < min_level() {
        return;
    }

    let use_colors = USE_COLORS.load(Ordering::Relaxed);
    if use_colors {
        print_internal(level.as_ansi_color());
    }
    print_internal("[");
    print_internal(level.as_str());
    print_internal("]");
    if use_colors {
        print_internal(LogLevel::ansi_reset());
    }
    print_internal(" ");
    let _ = write!(LogWriter, "{}", args);
    print_internal("\n");
}

/// Emits a fatal message and halts. Only for conditions the core
/// cannot continue past: a corrupted registry, a double-freed object.
#[cold]
pub fn log_fatal(args: core::fmt::Arguments) -> ! {
    log_print(LogLevel::Fatal, args);
    panic!("kernel halted after fatal log");
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log_print($crate::logging::LogLevel::Trace, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_print($crate::logging::LogLevel::Debug, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_print($crate::logging::LogLevel::Info, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_print($crate::logging::LogLevel::Warning, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_print($crate::logging::LogLevel::Error, format_args!($($arg)*));
    };
}
