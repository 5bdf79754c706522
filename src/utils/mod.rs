//! Utilities module for logging and error handling
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types
//! - General helper functions

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{Result, ResultExt, TumorScanError};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a duration given in milliseconds in a human-readable way
pub fn format_millis(millis: f64) -> String {
    if millis < 1000.0 {
        format!("{:.1} ms", millis)
    } else {
        format!("{:.2} s", millis / 1000.0)
    }
}

/// Format a probability as a percentage with four decimals
pub fn format_percent(probability: f32) -> String {
    format!("{:.4}%", probability as f64 * 100.0)
}
