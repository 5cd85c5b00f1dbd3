//! Diagnostics of the GPU layer
//!
//! Every component reports through one process-wide `Logger` (see
//! `Gpu::set_logger`). Errors carry the file and line of the call that
//! raised them; the `gpu_*` macros below fill entries in.

use std::time::SystemTime;

use chrono::{DateTime, Local};
use colored::*;

/// Sink for GPU-layer diagnostics
///
/// ```no_run
/// use galaxy_3d_gpu::galaxy3d::log::{LogEntry, LogSeverity, Logger};
///
/// /// Keeps only warnings and errors, e.g. for an in-app console
/// struct WarningsOnly;
///
/// impl Logger for WarningsOnly {
///     fn log(&self, entry: &LogEntry) {
///         if entry.severity >= LogSeverity::Warn {
///             eprintln!("{}: {}", entry.source, entry.message);
///         }
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// One diagnostic
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub timestamp: SystemTime,
    /// Reporting component, `"galaxy3d::gpu::<Component>"`
    pub source: String,
    pub message: String,
    /// Raising call site (errors only)
    pub file: Option<&'static str>,
    pub line: Option<u32>,
}

impl LogEntry {
    /// Entry stamped now, without a location
    pub fn new(severity: LogSeverity, source: &str, message: String) -> Self {
        Self {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: &'static str, line: u32) -> Self {
        self.file = Some(file);
        self.line = Some(line);
        self
    }
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Per-call context activity
    Trace,
    Debug,
    Info,
    /// Skipped draws, downgraded features
    Warn,
    /// Compile/link failures, rejected calls, incomplete framebuffers
    Error,
}

impl LogSeverity {
    /// Fixed-width tag used in console lines
    pub fn label(self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        }
    }

    fn colorize(self) -> ColoredString {
        let label = self.label();
        match self {
            LogSeverity::Trace => label.bright_black(),
            LogSeverity::Debug => label.cyan(),
            LogSeverity::Info => label.green(),
            LogSeverity::Warn => label.yellow(),
            LogSeverity::Error => label.red().bold(),
        }
    }
}

/// Console logger
///
/// `[timestamp] [SEVERITY] [source] message`, with ` (file:line)` appended
/// when the entry carries a location.
pub struct DefaultLogger;

impl DefaultLogger {
    /// The line printed for `entry`, without colors
    pub fn format_line(entry: &LogEntry) -> String {
        Self::compose(entry, entry.severity.label().to_string(), entry.source.clone())
    }

    fn compose(entry: &LogEntry, severity: String, source: String) -> String {
        let local: DateTime<Local> = entry.timestamp.into();
        let mut line = format!(
            "[{}] [{}] [{}] {}",
            local.format("%Y-%m-%d %H:%M:%S%.3f"),
            severity,
            source,
            entry.message
        );
        if let (Some(file), Some(number)) = (entry.file, entry.line) {
            line.push_str(&format!(" ({}:{})", file, number));
        }
        line
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let severity = entry.severity.colorize().to_string();
        let source = entry.source.bright_blue().to_string();
        println!("{}", Self::compose(entry, severity, source));
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message
#[macro_export]
macro_rules! gpu_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::galaxy3d::Gpu::log(
            $crate::galaxy3d::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
///
/// # Example
///
/// ```ignore
/// gpu_debug!("galaxy3d::gpu::Texture", "Allocated {} mip levels", levels);
/// ```
#[macro_export]
macro_rules! gpu_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::galaxy3d::Gpu::log(
            $crate::galaxy3d::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message
#[macro_export]
macro_rules! gpu_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::galaxy3d::Gpu::log(
            $crate::galaxy3d::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! gpu_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::galaxy3d::Gpu::log(
            $crate::galaxy3d::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! gpu_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::galaxy3d::Gpu::log_detailed(
            $crate::galaxy3d::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR message and return `Err(Error::$variant(message))`
///
/// # Example
///
/// ```ignore
/// gpu_bail!(InvalidUsage, "galaxy3d::gpu::Buffer", "Buffer size must be positive");
/// ```
#[macro_export]
macro_rules! gpu_bail {
    ($variant:ident, $source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::gpu_error!($source, "{}", message);
        return Err($crate::galaxy3d::Error::$variant(message));
    }};
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
