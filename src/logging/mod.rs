//! Logging infrastructure - structured tracing for the call paths
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable level, from the environment or the config file
//! - Zero-cost when disabled
//! - Optional JSON output and a plain-text log file

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::object::PyErr;

pub use tracing::{debug, error, info, trace, warn, Level};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // HSHIM_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("HSHIM_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // HSHIM_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("HSHIM_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("HSHIM_LOG_JSON").is_ok();
        config.show_spans = std::env::var("HSHIM_LOG_SPANS").is_ok();

        config
    }

    /// Create high-performance config (errors only)
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Create debug config (verbose logging)
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("handle_shim.log".to_string()),
            json_format: false,
            show_spans: true,
        }
    }
}

/// Level name to `Level`, defaulting to INFO
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration (first call wins)
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "handle_shim={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let console: Box<dyn Layer<Registry> + Send + Sync> = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(io::stderr)
                .with_span_events(span_events)
                .with_target(true)
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        let file = config
            .log_path
            .as_deref()
            .filter(|_| config.file_output)
            .map(|path| {
                let path = Path::new(path);
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let name = path
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| "handle_shim.log".into());
                fmt::layer()
                    .with_writer(tracing_appender::rolling::never(dir, name))
                    .with_ansi(false)
            });

        tracing_subscriber::registry()
            .with(console)
            .with(file)
            .with(env_filter)
            .try_init()
            .ok(); // Ignore error if a global subscriber is already set
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Shim-specific events
// ============================================================================

/// Log a generic call entering the object model
#[inline]
pub fn log_call(operation: &'static str, nargs: usize, nkw: usize) {
    trace!(
        event = "call",
        operation,
        positional = nargs,
        keywords = nkw,
        "call dispatched"
    );
}

/// Log a trampoline dispatch
#[inline]
pub fn log_dispatch(signature: &'static str, nargs: usize) {
    trace!(
        event = "trampoline",
        signature,
        args = nargs,
        "trampoline dispatch"
    );
}

/// Log a call that ended with an exception
pub fn log_call_failure(err: &PyErr) {
    debug!(
        event = "call_failure",
        exception = err.kind().name(),
        message = err.message(),
        "call raised"
    );
}

/// Log handles left open when a leak detector stopped
pub fn log_leaks(count: usize, generation: u64) {
    warn!(
        event = "handle_leak",
        leaked = count,
        generation,
        "unclosed handles detected"
    );
}

/// Log a contract violation right before aborting
pub fn log_fatal(what: &str) {
    error!(event = "fatal", violation = what, "contract violation, aborting");
}

/// Log shim initialization
pub fn log_init(strategy: &str) {
    info!(event = "init", strategy, "handle shim initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.file_output);

        let perf_config = LogConfig::performance();
        assert_eq!(perf_config.level, Level::ERROR);

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
        assert!(debug_config.show_spans);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_init_idempotent() {
        init_with_config(LogConfig::performance());
        init(); // Should not panic
        assert!(is_initialized());
    }
}
