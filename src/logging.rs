//! Structured logging and tracing for the EVSE controller
//!
//! Installs a `tracing-subscriber` registry with a console layer and an
//! optional daily-rolling file layer, and provides a small component-scoped
//! logger used by the state machine and its collaborators.

use crate::config::LoggingConfig;
use crate::error::{EvseError, Result};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{Level, debug, error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod level;

pub use level::parse_log_level;

static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Install the global subscriber. Later calls return the outcome of the first.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        if let Err(e) = install(config) {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    match INIT_ERROR.get() {
        Some(err) => Err(EvseError::config(err.clone())),
        None => Ok(()),
    }
}

fn install(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("evse_controller={},tower_http=warn", level).into());

    let file_enabled = !cfg!(test)
        && !config.file.is_empty()
        && std::env::var_os("EVSE_DISABLE_FILE_LOG").is_none();

    if !file_enabled {
        // Embedding hosts and test binaries may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer(config.json_format, level))
            .try_init();
        info!("Logging initialized at {:?}, console only", level);
        return Ok(());
    }

    let (dir, prefix) = log_file_target(&config.file);
    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(config.backup_count.max(1) as usize)
        .build(&dir)
        .map_err(|e| {
            EvseError::io(format!(
                "Cannot open log directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    let (writer, guard) = non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);
    let file_layer = if config.json_format {
        file_layer.json().with_filter(LevelFilter::from_level(level)).boxed()
    } else {
        file_layer.with_filter(LevelFilter::from_level(level)).boxed()
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = if config.console_output {
        registry
            .with(console_layer(config.json_format, level))
            .try_init()
    } else {
        registry.try_init()
    };
    installed.map_err(|e| EvseError::config(format!("Failed to install subscriber: {}", e)))?;

    info!("Logging initialized at {:?}, file {}", level, config.file);
    Ok(())
}

/// Split a configured log path into the rolling directory and file prefix.
///
/// `/tmp/evse.log` rolls as `/tmp/evse.<date>.log`; a path without an
/// extension is taken as the directory itself.
fn log_file_target(file: &str) -> (PathBuf, String) {
    let path = Path::new(file);
    match (path.extension(), path.file_stem()) {
        (Some(_), Some(stem)) => (
            path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            stem.to_string_lossy().into_owned(),
        ),
        _ => (path.to_path_buf(), "evse".to_string()),
    }
}

fn console_layer<S>(json_format: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    if json_format {
        layer.json().with_filter(LevelFilter::from_level(level)).boxed()
    } else {
        layer.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

/// Fields attached to every line a logger emits
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Reporting component ("controller", "driver", "web", ...)
    pub component: String,

    /// Charging session the line belongs to
    pub session_id: Option<String>,

    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            session_id: None,
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_session_id(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Component-scoped logger
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn component(&self) -> &str {
        &self.context.component
    }

    pub fn info(&self, message: &str) {
        info!(
            component = %self.context.component,
            session = self.session(),
            extra = %self.extra(),
            "{}",
            message
        );
    }

    pub fn warn(&self, message: &str) {
        warn!(
            component = %self.context.component,
            session = self.session(),
            extra = %self.extra(),
            "{}",
            message
        );
    }

    pub fn error(&self, message: &str) {
        error!(
            component = %self.context.component,
            session = self.session(),
            extra = %self.extra(),
            "{}",
            message
        );
    }

    pub fn debug(&self, message: &str) {
        debug!(
            component = %self.context.component,
            session = self.session(),
            extra = %self.extra(),
            "{}",
            message
        );
    }

    pub fn trace(&self, message: &str) {
        trace!(
            component = %self.context.component,
            session = self.session(),
            extra = %self.extra(),
            "{}",
            message
        );
    }

    fn session(&self) -> &str {
        self.context.session_id.as_deref().unwrap_or("-")
    }

    fn extra(&self) -> String {
        self.context
            .extra_fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Logger for a component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Logger carrying session or extra fields
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_logger_carries_its_fields() {
        let logger = get_logger_with_context(
            LogContext::new("session")
                .with_session_id("abc".to_string())
                .with_field("entry", "Remote".to_string())
                .with_field("amps", "16".to_string()),
        );
        assert_eq!(logger.component(), "session");
        assert_eq!(logger.session(), "abc");
        assert_eq!(logger.extra(), "amps=16,entry=Remote");
        assert_eq!(get_logger("pilot").session(), "-");
    }

    #[test]
    fn log_path_splits_into_directory_and_prefix() {
        assert_eq!(
            log_file_target("/tmp/evse.log"),
            (PathBuf::from("/tmp"), "evse".to_string())
        );
        assert_eq!(
            log_file_target("/var/log/charger"),
            (PathBuf::from("/var/log/charger"), "evse".to_string())
        );
    }

    #[test]
    fn init_is_idempotent_and_loggers_do_not_panic() {
        assert!(init_logging(&LoggingConfig::default()).is_ok());
        assert!(init_logging(&LoggingConfig::default()).is_ok());

        let logger = get_logger("controller");
        logger.info("info line");
        logger.debug("debug line");
        logger.warn("warn line");
        logger.error("error line");
        logger.trace("trace line");
    }
}
