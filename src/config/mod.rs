//! Configuration module for apphost.
//!
//! Handles loading the JSON configuration document and resolving options
//! for the current run mode. Lookup order for an option is:
//! command-line override, `modes.<mode>.<key>`, then top-level `<key>`.

mod cli;

pub use cli::Cli;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default configuration file name, resolved against the app path.
pub const CONFIG_FILE_NAME: &str = "apphost.config.json";

/// Placeholder in extension commands replaced with the app path.
pub const PATH_PLACEHOLDER: &str = "${NL_PATH}";

/// Application id used when the document does not declare one.
const DEFAULT_APP_ID: &str = "apphost";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration is not valid JSON.
    #[error("Configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration root is not an object.
    #[error("Configuration root must be a JSON object")]
    NotAnObject,

    /// Unknown `defaultMode` value.
    #[error("Unknown run mode: {0}")]
    UnknownMode(String),
}

/// Mutually exclusive run modes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Native window driven by the window subsystem's event loop.
    #[default]
    Window,
    /// Opens the navigation URL in the system browser.
    Browser,
    /// Headless server.
    Cloud,
    /// Embedded chrome shell.
    Chrome,
}

impl RunMode {
    /// Returns the configuration key of this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Window => "window",
            RunMode::Browser => "browser",
            RunMode::Cloud => "cloud",
            RunMode::Chrome => "chrome",
        }
    }

    /// Parses a mode name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "window" => Some(RunMode::Window),
            "browser" => Some(RunMode::Browser),
            "cloud" => Some(RunMode::Cloud),
            "chrome" => Some(RunMode::Chrome),
            _ => None,
        }
    }

    /// Returns true for modes that block on the shutdown wait.
    #[must_use]
    pub fn is_headless(self) -> bool {
        !matches!(self, RunMode::Window)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loaded application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    document: Value,
    mode: RunMode,
    app_path: PathBuf,
    overrides: Map<String, Value>,
}

impl Settings {
    /// Builds settings from an already parsed document.
    ///
    /// The run mode comes from `defaultMode` (default: window).
    pub fn from_document(document: Value, app_path: PathBuf) -> Result<Self, ConfigError> {
        if !document.is_object() {
            return Err(ConfigError::NotAnObject);
        }

        let mode = match document.get("defaultMode").and_then(Value::as_str) {
            Some(name) => {
                RunMode::parse(name).ok_or_else(|| ConfigError::UnknownMode(name.to_string()))?
            }
            None => RunMode::default(),
        };

        Ok(Self {
            document,
            mode,
            app_path,
            overrides: Map::new(),
        })
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path, app_path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = serde_json::from_str(&content)?;
        Self::from_document(document, app_path)
    }

    /// Replaces the run mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets an option that takes precedence over the document.
    pub fn set_override(&mut self, key: &str, value: Value) {
        self.overrides.insert(key.to_string(), value);
    }

    /// Returns the configuration document as loaded.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Returns the current run mode.
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns the application install path.
    #[must_use]
    pub fn app_path(&self) -> &Path {
        &self.app_path
    }

    /// Returns the application id.
    #[must_use]
    pub fn app_id(&self) -> &str {
        self.document
            .get("applicationId")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_APP_ID)
    }

    /// Looks up an option for the current mode.
    ///
    /// `null` values are treated as absent.
    #[must_use]
    pub fn option_for_mode(&self, key: &str) -> Option<&Value> {
        let non_null = |v: &&Value| !v.is_null();
        self.overrides
            .get(key)
            .filter(non_null)
            .or_else(|| {
                self.document
                    .get("modes")
                    .and_then(|modes| modes.get(self.mode.as_str()))
                    .and_then(|mode| mode.get(key))
                    .filter(non_null)
            })
            .or_else(|| self.document.get(key).filter(non_null))
    }

    /// Returns a boolean option, `false` when absent or not a bool.
    #[must_use]
    pub fn bool_option(&self, key: &str) -> bool {
        self.option_for_mode(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Returns the configured port, `0` when absent or out of range.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.option_for_mode("port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(0)
    }

    /// Returns the `modes.<mode>` object, or an empty object.
    #[must_use]
    pub fn mode_options(&self) -> Value {
        self.document
            .get("modes")
            .and_then(|modes| modes.get(self.mode.as_str()))
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Returns the URL the frontend should navigate to.
    ///
    /// Absolute URLs are used as-is; paths are resolved against the local
    /// server.
    #[must_use]
    pub fn navigation_url(&self, port: u16) -> String {
        let url = self
            .option_for_mode("url")
            .and_then(Value::as_str)
            .unwrap_or("/");

        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("http://127.0.0.1:{}{}", port, url)
        } else {
            format!("http://127.0.0.1:{}/{}", port, url)
        }
    }
}

/// Replaces every [`PATH_PLACEHOLDER`] in `command` with the app path.
///
/// The replacement is a single pass, so an app path that itself contains
/// the placeholder is not expanded again.
#[must_use]
pub fn substitute_app_path(command: &str, app_path: &Path) -> String {
    command.replace(PATH_PLACEHOLDER, &app_path.to_string_lossy())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(document: Value) -> Settings {
        Settings::from_document(document, PathBuf::from("/opt/app")).unwrap()
    }

    #[test]
    fn test_default_mode_is_window() {
        assert_eq!(settings(json!({})).mode(), RunMode::Window);
        assert_eq!(
            settings(json!({"defaultMode": "cloud"})).mode(),
            RunMode::Cloud
        );
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = Settings::from_document(json!({"defaultMode": "tv"}), PathBuf::new());
        assert!(matches!(err, Err(ConfigError::UnknownMode(m)) if m == "tv"));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = Settings::from_document(json!([1, 2]), PathBuf::new());
        assert!(matches!(err, Err(ConfigError::NotAnObject)));
    }

    #[test]
    fn test_option_lookup_order() {
        let mut s = settings(json!({
            "defaultMode": "cloud",
            "port": 1000,
            "enableServer": true,
            "modes": {"cloud": {"port": 2000, "enableServer": null}}
        }));
        assert_eq!(s.port(), 2000);
        assert!(s.bool_option("enableServer"));

        s.set_override("port", json!(3000));
        assert_eq!(s.port(), 3000);
    }

    #[test]
    fn test_mode_options_only_for_current_mode() {
        let s = settings(json!({
            "defaultMode": "browser",
            "modes": {"window": {"width": 800}, "browser": {"nativeBlockList": []}}
        }));
        assert!(s.mode_options().get("nativeBlockList").is_some());
        assert!(s.mode_options().get("width").is_none());
        assert!(s.with_mode(RunMode::Chrome).mode_options().as_object().unwrap().is_empty());
    }

    #[test]
    fn test_navigation_url() {
        assert_eq!(
            settings(json!({"url": "/index.html"})).navigation_url(8080),
            "http://127.0.0.1:8080/index.html"
        );
        assert_eq!(
            settings(json!({"url": "https://example.com"})).navigation_url(8080),
            "https://example.com"
        );
        assert_eq!(settings(json!({})).navigation_url(1), "http://127.0.0.1:1/");
    }

    #[test]
    fn test_substitute_app_path() {
        let path = Path::new("/opt/app");
        assert_eq!(
            substitute_app_path("node ${NL_PATH}/ext/main.js", path),
            "node /opt/app/ext/main.js"
        );
        assert_eq!(substitute_app_path("echo plain", path), "echo plain");
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!(RunMode::parse("CLOUD"), Some(RunMode::Cloud));
        assert_eq!(RunMode::parse("nope"), None);
        assert!(RunMode::Chrome.is_headless());
        assert!(!RunMode::Window.is_headless());
    }
}
