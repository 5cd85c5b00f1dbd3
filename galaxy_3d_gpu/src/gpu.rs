/// Galaxy3D GPU facade - process-wide services of the GPU layer
///
/// The graphics context itself is single-threaded and owned by a `Device`;
/// the only process-wide state is the logger slot, kept here behind a
/// lazily initialised RwLock.

use std::sync::{OnceLock, RwLock};

use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};

static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

fn logger_slot() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

fn install(logger: Box<dyn Logger>) {
    if let Ok(mut slot) = logger_slot().write() {
        *slot = logger;
    }
}

/// Process-wide entry point of the GPU layer
pub struct Gpu;

impl Gpu {
    /// Route every diagnostic of the layer to `logger`
    ///
    /// ```no_run
    /// use galaxy_3d_gpu::galaxy3d::{Gpu, log::{Logger, LogEntry}};
    ///
    /// struct Silent;
    /// impl Logger for Silent {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Gpu::set_logger(Silent);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        install(Box::new(logger));
    }

    /// Back to the console logger
    pub fn reset_logger() {
        install(Box::new(DefaultLogger));
    }

    /// Hand `entry` to the current logger
    pub fn dispatch(entry: &LogEntry) {
        if let Ok(slot) = logger_slot().read() {
            slot.log(entry);
        }
    }

    /// Used by `gpu_trace!` .. `gpu_warn!`
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        Self::dispatch(&LogEntry::new(severity, source, message));
    }

    /// Used by `gpu_error!`: the entry carries the raising call site
    pub fn log_detailed(severity: LogSeverity, source: &str, message: String, file: &'static str, line: u32) {
        Self::dispatch(&LogEntry::new(severity, source, message).at(file, line));
    }
}
