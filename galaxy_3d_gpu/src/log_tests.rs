//! Unit tests for log.rs
//!
//! Tests LogEntry, LogSeverity, DefaultLogger and the gpu_* macros.

use crate::galaxy3d::{Gpu, Error};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// SEVERITY AND ENTRIES
// ============================================================================

#[test]
fn test_severity_order_and_labels() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
    // labels keep console columns aligned
    for severity in [LogSeverity::Trace, LogSeverity::Info, LogSeverity::Warn, LogSeverity::Error] {
        assert_eq!(severity.label().len(), 5);
    }
}

#[test]
fn test_entry_location() {
    let entry = LogEntry::new(LogSeverity::Warn, "galaxy3d::gpu::Device", "draw skipped".to_string());
    assert_eq!(entry.file, None);
    assert_eq!(entry.source, "galaxy3d::gpu::Device");

    let located = entry.at("program.rs", 42);
    assert_eq!(located.file, Some("program.rs"));
    assert_eq!(located.line, Some(42));
}

// ============================================================================
// DEFAULT LOGGER
// ============================================================================

#[test]
fn test_default_logger_line_format() {
    let entry = LogEntry::new(LogSeverity::Info, "galaxy3d::gpu::Device", "context restored".to_string());
    let line = DefaultLogger::format_line(&entry);
    assert!(line.starts_with('['));
    assert!(line.ends_with("[INFO ] [galaxy3d::gpu::Device] context restored"));

    let error = LogEntry::new(LogSeverity::Error, "galaxy3d::gpu::Program", "link failed".to_string()).at("program.rs", 7);
    assert!(DefaultLogger::format_line(&error).ends_with("[ERROR] [galaxy3d::gpu::Program] link failed (program.rs:7)"));

    // printing must not panic for any severity
    DefaultLogger.log(&entry);
    DefaultLogger.log(&error);
}

#[test]
fn test_logger_trait_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DefaultLogger>();
}

// ============================================================================
// FACADE + MACRO TESTS
// ============================================================================

struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

fn capture() -> Arc<Mutex<Vec<LogEntry>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Gpu::set_logger(CaptureLogger { entries: entries.clone() });
    entries
}

#[test]
#[serial]
fn test_macros_route_through_custom_logger() {
    let entries = capture();

    crate::gpu_debug!("galaxy3d::gpu::Texture", "allocated {} levels", 9);
    crate::gpu_warn!("galaxy3d::gpu::Device", "draw skipped");
    crate::gpu_error!("galaxy3d::gpu::Program", "link failed: {}", "missing main");

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[0].severity, LogSeverity::Debug);
        assert_eq!(captured[0].message, "allocated 9 levels");
        assert!(captured[0].file.is_none());
        assert_eq!(captured[1].source, "galaxy3d::gpu::Device");
        assert_eq!(captured[2].severity, LogSeverity::Error);
        assert!(captured[2].file.is_some());
        assert!(captured[2].line.is_some());
    }

    Gpu::reset_logger();
}

#[test]
#[serial]
fn test_bail_logs_and_returns_error() {
    fn failing(size: u64) -> crate::galaxy3d::Result<u64> {
        if size == 0 {
            crate::gpu_bail!(InvalidUsage, "galaxy3d::gpu::Buffer", "size must be positive, got {}", size);
        }
        Ok(size)
    }

    let entries = capture();

    assert_eq!(failing(4), Ok(4));
    let err = failing(0).unwrap_err();
    assert_eq!(err, Error::InvalidUsage("size must be positive, got 0".to_string()));

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].severity, LogSeverity::Error);
        assert_eq!(captured[0].message, "size must be positive, got 0");
    }

    Gpu::reset_logger();
}
