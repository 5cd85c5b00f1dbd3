/// Error tracking for the headless context
///
/// Every error the context raises goes through `ErrorTracker::record`:
/// it is counted per code, grouped by call, and optionally printed in color
/// as it happens. `print_error_stats_report` summarizes a run.

use std::cell::{Cell, RefCell};

use colored::*;
use galaxy_3d_gpu::galaxy3d::context::gl;
use rustc_hash::FxHashMap;

/// Raised errors, counted per code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorStats {
    pub invalid_enum: u32,
    pub invalid_value: u32,
    pub invalid_operation: u32,
    pub invalid_framebuffer_operation: u32,
    pub out_of_memory: u32,
    pub context_lost: u32,
}

impl ErrorStats {
    pub fn total(&self) -> u32 {
        self.invalid_enum
            + self.invalid_value
            + self.invalid_operation
            + self.invalid_framebuffer_operation
            + self.out_of_memory
            + self.context_lost
    }
}

/// Name of an error code, as the host API spells it
pub fn error_name(code: u32) -> &'static str {
    match code {
        gl::NO_ERROR => "NO_ERROR",
        gl::INVALID_ENUM => "INVALID_ENUM",
        gl::INVALID_VALUE => "INVALID_VALUE",
        gl::INVALID_OPERATION => "INVALID_OPERATION",
        gl::INVALID_FRAMEBUFFER_OPERATION => "INVALID_FRAMEBUFFER_OPERATION",
        gl::OUT_OF_MEMORY => "OUT_OF_MEMORY",
        gl::CONTEXT_LOST_WEBGL => "CONTEXT_LOST_WEBGL",
        _ => "UNKNOWN_ERROR",
    }
}

/// Per-context error counters
#[derive(Debug, Default)]
pub(crate) struct ErrorTracker {
    stats: Cell<ErrorStats>,
    /// Occurrences per (call, code) pair
    messages: RefCell<FxHashMap<(&'static str, u32), u32>>,
    print: Cell<bool>,
}

impl ErrorTracker {
    pub(crate) fn new(print: bool) -> Self {
        let tracker = Self::default();
        tracker.print.set(print);
        tracker
    }

    pub(crate) fn set_print(&self, print: bool) {
        self.print.set(print);
    }

    pub(crate) fn record(&self, call: &'static str, code: u32, message: &str) {
        let mut stats = self.stats.get();
        match code {
            gl::INVALID_ENUM => stats.invalid_enum += 1,
            gl::INVALID_VALUE => stats.invalid_value += 1,
            gl::INVALID_OPERATION => stats.invalid_operation += 1,
            gl::INVALID_FRAMEBUFFER_OPERATION => stats.invalid_framebuffer_operation += 1,
            gl::OUT_OF_MEMORY => stats.out_of_memory += 1,
            gl::CONTEXT_LOST_WEBGL => stats.context_lost += 1,
            _ => {}
        }
        self.stats.set(stats);

        let occurrence = {
            let mut messages = self.messages.borrow_mut();
            let count = messages.entry((call, code)).or_insert(0);
            *count += 1;
            *count
        };

        if self.print.get() {
            let repeat = if occurrence > 1 {
                format!(" (x{})", occurrence).bright_black().to_string()
            } else {
                String::new()
            };
            eprintln!(
                "{} {} {}: {}{}",
                "[HEADLESS]".bright_blue().bold(),
                error_name(code).red().bold(),
                call.yellow(),
                message,
                repeat
            );
        }
    }

    pub(crate) fn stats(&self) -> ErrorStats {
        self.stats.get()
    }

    /// Calls that raised the same error more than once
    pub(crate) fn repeated(&self) -> u32 {
        self.messages.borrow().values().filter(|&&count| count > 1).count() as u32
    }

    pub(crate) fn reset(&self) {
        self.stats.set(ErrorStats::default());
        self.messages.borrow_mut().clear();
    }
}

/// Print a colored summary of `stats`
pub fn print_error_stats_report(stats: &ErrorStats, repeated: u32) {
    if stats.total() == 0 {
        println!("\n{}", "✓ No context errors".green().bold());
        return;
    }

    println!("\n{}", "=== Context Error Report ===".bright_blue().bold());
    let rows = [
        ("INVALID_ENUM:", stats.invalid_enum),
        ("INVALID_VALUE:", stats.invalid_value),
        ("INVALID_OPERATION:", stats.invalid_operation),
        ("INVALID_FRAMEBUFFER_OPERATION:", stats.invalid_framebuffer_operation),
        ("OUT_OF_MEMORY:", stats.out_of_memory),
    ];
    for (label, count) in rows {
        if count > 0 {
            println!("  {} {}", label.red().bold(), count);
        }
    }
    if stats.context_lost > 0 {
        println!("  {} {}", "CONTEXT_LOST_WEBGL:".yellow().bold(), stats.context_lost);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if repeated > 0 {
        println!("\n  {} {} call(s) raised the same error repeatedly", "ℹ".cyan(), repeated);
    }
    println!("{}\n", "============================".bright_blue().bold());
}
