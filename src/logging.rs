//! Logging setup.
//!
//! Records go to a timestamped file under `<app path>/logs/` or to stderr,
//! depending on the `logging` option. Old log files are removed at startup.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Settings;

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 24;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log directory name under the application path.
pub const LOG_DIRECTORY: &str = "logs";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether a subscriber is installed at all.
    pub enabled: bool,
    /// Write to a log file instead of stderr.
    pub write_to_file: bool,
    /// Log level (trace, debug, info, warn, error, off).
    pub level: String,
    /// Log retention period in hours.
    pub retention_hours: u32,
    /// Directory holding log files.
    pub directory: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_to_file: true,
            level: DEFAULT_LOG_LEVEL.to_string(),
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
            directory: PathBuf::from(LOG_DIRECTORY),
        }
    }
}

impl LogConfig {
    /// Reads the `logging` option for the current mode.
    ///
    /// `level_override` (from the command line) wins over `logging.level`.
    #[must_use]
    pub fn from_settings(settings: &Settings, level_override: Option<&str>) -> Self {
        let logging = settings.option_for_mode("logging");
        let flag = |key: &str| logging.and_then(|l| l.get(key)).and_then(Value::as_bool);

        let level = level_override
            .or_else(|| logging.and_then(|l| l.get("level")).and_then(Value::as_str))
            .map_or_else(|| DEFAULT_LOG_LEVEL.to_string(), Self::parse_level);

        let retention_hours = logging
            .and_then(|l| l.get("retentionHours"))
            .and_then(Value::as_u64)
            .and_then(|h| u32::try_from(h).ok())
            .unwrap_or(DEFAULT_LOG_RETENTION_HOURS);

        Self {
            enabled: flag("enabled").unwrap_or(true),
            write_to_file: flag("writeToLogFile").unwrap_or(true),
            level,
            retention_hours,
            directory: settings.app_path().join(LOG_DIRECTORY),
        }
    }

    /// Parses log level from string.
    #[must_use]
    pub fn parse_level(value: &str) -> String {
        match value.to_lowercase().as_str() {
            "trace" => "trace".to_string(),
            "debug" => "debug".to_string(),
            "info" => "info".to_string(),
            "warn" | "warning" => "warn".to_string(),
            "error" => "error".to_string(),
            "off" | "none" | "disabled" => "off".to_string(),
            _ => DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Returns a fresh timestamped log file path.
    #[must_use]
    pub fn log_file_path(&self) -> PathBuf {
        let now = chrono::Local::now();
        let filename = format!("apphost_{}.log", now.format("%Y-%m-%d_%H-%M-%S"));
        self.directory.join(filename)
    }
}

/// Removes `.log` files in `directory` older than the retention period.
///
/// # Errors
/// Returns error if the directory cannot be read.
pub fn cleanup_old_logs(directory: &Path, retention_hours: u32) -> io::Result<u32> {
    if !directory.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(u64::from(retention_hours) * 3600);
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Installs the global subscriber.
///
/// Returns the log file path when records go to a file.
///
/// # Errors
/// Returns error if the log file cannot be created or a subscriber is
/// already installed.
pub fn init(config: &LogConfig) -> io::Result<Option<PathBuf>> {
    if !config.enabled || config.level == "off" {
        return Ok(None);
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, log_path, deleted) = if config.write_to_file {
        fs::create_dir_all(&config.directory)?;
        let deleted = cleanup_old_logs(&config.directory, config.retention_hours)?;
        let log_path = config.log_file_path();
        let log_file = File::create(&log_path)?;
        let layer = fmt::layer()
            .with_writer(Mutex::new(log_file))
            .with_ansi(false)
            .with_target(true)
            .with_line_number(false);
        (Some(layer), Some(log_path), deleted)
    } else {
        (None, None, 0)
    };

    let stderr_layer = (!config.write_to_file).then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(io::Error::other)?;

    tracing::info!("Logging initialized at level {}", config.level);
    if let Some(path) = &log_path {
        tracing::info!("Log file: {}", path.display());
    }
    if deleted > 0 {
        tracing::info!("Cleaned up {} old log file(s)", deleted);
    }

    Ok(log_path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.retention_hours, DEFAULT_LOG_RETENTION_HOURS);
        assert_eq!(config.level, DEFAULT_LOG_LEVEL);
        assert!(config.enabled);
        assert!(config.write_to_file);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(LogConfig::parse_level("DEBUG"), "debug");
        assert_eq!(LogConfig::parse_level("warning"), "warn");
        assert_eq!(LogConfig::parse_level("none"), "off");
        assert_eq!(LogConfig::parse_level("invalid"), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::from_document(
            json!({
                "logging": {"enabled": true, "writeToLogFile": false, "retentionHours": 2},
                "modes": {"cloud": {"logging": {"enabled": false}}}
            }),
            PathBuf::from("/opt/app"),
        )
        .unwrap();

        let config = LogConfig::from_settings(&settings, Some("trace"));
        assert!(config.enabled);
        assert!(!config.write_to_file);
        assert_eq!(config.level, "trace");
        assert_eq!(config.retention_hours, 2);
        assert_eq!(config.directory, PathBuf::from("/opt/app/logs"));

        let cloud = settings.with_mode(crate::config::RunMode::Cloud);
        assert!(!LogConfig::from_settings(&cloud, None).enabled);
    }

    #[test]
    fn test_cleanup_keeps_recent_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("recent.log"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 1).unwrap(), 0);
        assert!(dir.path().join("recent.log").exists());
        assert_eq!(cleanup_old_logs(&dir.path().join("missing"), 1).unwrap(), 0);
    }
}
