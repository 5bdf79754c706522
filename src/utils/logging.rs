//! Logging Module
//!
//! Provides structured logging utilities using the `tracing` crate.
//! `RUST_LOG` takes precedence over the configured level when it is set.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Create a quiet logging config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    /// Create a production logging config
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: true,
            include_thread_ids: false,
            ansi_colors: false,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Create from string, falling back to `Info`
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// # Returns
/// * `Result<(), String>` - Ok if logging was initialized, Err with message otherwise
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Times the stages of one analysis and logs them at debug level
pub struct StageTimer {
    /// Name of the analysis being timed
    operation: String,
    /// Start of the current stage
    stage_start: Instant,
    /// Start of the whole operation
    start: Instant,
    /// Completed stages with their durations in milliseconds
    stages: Vec<(String, f64)>,
}

impl StageTimer {
    /// Start timing an operation
    pub fn new(operation: &str) -> Self {
        let now = Instant::now();
        Self {
            operation: operation.to_string(),
            stage_start: now,
            start: now,
            stages: Vec::new(),
        }
    }

    /// Mark the end of a stage
    pub fn stage(&mut self, name: &str) {
        let elapsed = self.stage_start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!("{}: {} took {:.1} ms", self.operation, name, elapsed);
        self.stages.push((name.to_string(), elapsed));
        self.stage_start = Instant::now();
    }

    /// Recorded stages
    pub fn stages(&self) -> &[(String, f64)] {
        &self.stages
    }

    /// Log completion and return the total time in milliseconds
    pub fn finish(&self) -> f64 {
        let total = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            "{}: completed {} stages in {:.1} ms",
            self.operation,
            self.stages.len(),
            total
        );
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from_str("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.ansi_colors);
    }

    #[test]
    fn test_stage_timer() {
        let mut timer = StageTimer::new("Test");
        timer.stage("preprocess");
        timer.stage("predict");
        assert_eq!(timer.stages().len(), 2);
        assert_eq!(timer.stages()[1].0, "predict");
        assert!(timer.finish() >= 0.0);
    }
}
