//! Embedded chrome shell launcher.
//!
//! Starts a Chromium-family browser in app mode pointed at the navigation
//! URL. The browser process is tracked in the host process table so the
//! shutdown sequence terminates it.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::host::{ChromeShell, HostError};
use crate::process::{OutputSinks, ProcessTable, Spawner};

/// Binary names searched on `PATH`, in order.
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

/// Finds the first chrome-like binary on `PATH`.
#[must_use]
pub fn locate_chrome() -> Option<PathBuf> {
    CHROME_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches chrome through a [`Spawner`].
pub struct ChromeLauncher {
    spawner: Arc<dyn Spawner>,
    processes: Arc<ProcessTable>,
}

impl ChromeLauncher {
    /// Creates a launcher tracking its browser process in `processes`.
    #[must_use]
    pub fn new(spawner: Arc<dyn Spawner>, processes: Arc<ProcessTable>) -> Self {
        Self { spawner, processes }
    }

    /// Builds the launch command from the `modes.chrome` options.
    ///
    /// `binaryPath` overrides the `PATH` search; `args` is appended
    /// verbatim.
    pub fn command_line(options: &Value) -> Result<String, HostError> {
        let url = options
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| HostError::InvalidOptions("missing url".into()))?;

        let binary = match options.get("binaryPath").and_then(Value::as_str) {
            Some(path) => PathBuf::from(path),
            None => locate_chrome().ok_or(HostError::Unavailable("Chrome"))?,
        };

        let mut command = format!("\"{}\" --app=\"{}\"", binary.display(), url);
        if let Some(args) = options.get("args").and_then(Value::as_str) {
            command.push(' ');
            command.push_str(args);
        }
        Ok(command)
    }
}

impl ChromeShell for ChromeLauncher {
    fn init(&self, options: &Value) -> Result<(), HostError> {
        let command = Self::command_line(options)?;
        let handle = self.spawner.spawn(&command, OutputSinks::discard())?;
        let id = self.processes.track(handle);
        info!("Chrome shell started as process {}", id);
        Ok(())
    }
}
