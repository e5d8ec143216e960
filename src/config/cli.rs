//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;

use super::{CONFIG_FILE_NAME, ConfigError, RunMode, Settings};

/// apphost command line.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "apphost", version, about = "Native application host")]
pub struct Cli {
    /// Application install path (default: current directory).
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Configuration file (default: <path>/apphost.config.json).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run mode override.
    #[arg(long, value_enum)]
    pub mode: Option<RunMode>,

    /// Server port override (0 picks a free port).
    #[arg(long)]
    pub port: Option<u16>,

    /// Navigation URL override.
    #[arg(long)]
    pub url: Option<String>,

    /// Enable extensions regardless of configuration.
    #[arg(long)]
    pub enable_extensions: bool,

    /// Export auth info regardless of configuration.
    #[arg(long)]
    pub export_auth_info: bool,

    /// Log level (trace, debug, info, warn, error, off).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Returns the application path.
    #[must_use]
    pub fn app_path(&self) -> PathBuf {
        self.path
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns the configuration file path.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.app_path().join(CONFIG_FILE_NAME))
    }

    /// Loads settings and applies command-line overrides.
    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::load(&self.config_path(), self.app_path())?;
        self.apply(&mut settings);
        Ok(settings)
    }

    /// Applies overrides to already loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(mode) = self.mode {
            *settings = settings.clone().with_mode(mode);
        }
        if let Some(port) = self.port {
            settings.set_override("port", Value::from(port));
        }
        if let Some(url) = &self.url {
            settings.set_override("url", Value::from(url.as_str()));
        }
        if self.enable_extensions {
            settings.set_override("enableExtensions", Value::Bool(true));
        }
        if self.export_auth_info {
            settings.set_override("exportAuthInfo", Value::Bool(true));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::parse_from([
            "apphost",
            "--path",
            "/opt/app",
            "--mode",
            "cloud",
            "--port",
            "5000",
            "--enable-extensions",
        ]);
        assert_eq!(cli.mode, Some(RunMode::Cloud));
        assert_eq!(cli.port, Some(5000));
        assert!(cli.enable_extensions);
        assert!(!cli.export_auth_info);
        assert_eq!(
            cli.config_path(),
            PathBuf::from("/opt/app").join(CONFIG_FILE_NAME)
        );
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::parse_from(["apphost", "--mode", "browser", "--port", "9", "--url", "/x"]);
        let mut settings =
            Settings::from_document(json!({"defaultMode": "cloud", "port": 1}), PathBuf::new())
                .unwrap();
        cli.apply(&mut settings);
        assert_eq!(settings.mode(), RunMode::Browser);
        assert_eq!(settings.port(), 9);
        assert_eq!(settings.navigation_url(9), "http://127.0.0.1:9/x");
        assert!(!settings.bool_option("enableExtensions"));
    }
}
