//! Collaborator contracts.
//!
//! The transport server, tray, window, chrome shell, browser launcher and
//! dialogs live outside this crate's core. They are reached only through
//! the narrow traits below. Each trait has a minimal default used by the
//! `apphost` binary.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::chrome::ChromeLauncher;
use crate::process::{ProcessError, ProcessTable, Spawner};

/// Collaborator errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Child process failure.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// The collaborator is not available on this build or platform.
    #[error("{0} is not available")]
    Unavailable(&'static str),

    /// Invalid options were passed.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

/// Start/stop/status contract of the transport server.
pub trait TransportServer: Send + Sync {
    /// Returns true while the server is accepting connections.
    fn is_running(&self) -> bool;

    /// Stops the server. Must be idempotent.
    fn stop(&self) -> Result<(), HostError>;

    /// Returns the bound port.
    fn port(&self) -> u16;
}

/// Delivers events to every connected frontend session.
pub trait EventDispatcher: Send + Sync {
    /// Dispatches `event` with `data`; returns the number of sessions
    /// reached.
    fn dispatch_to_all(&self, event: &str, data: &Value) -> Result<usize, HostError>;
}

/// Tray icon contract.
pub trait Tray: Send + Sync {
    /// Returns true if a tray icon is shown.
    fn is_active(&self) -> bool;

    /// Removes the tray icon.
    fn remove(&self) -> Result<(), HostError>;
}

/// Native window contract.
pub trait WindowController: Send + Sync {
    /// Runs the window event loop with the `modes.window` options.
    fn run(&self, options: &Value) -> Result<(), HostError>;

    /// Closes the window and terminates the process with `code`.
    fn close(&self, code: i32) -> Result<(), HostError>;
}

/// Embedded chrome shell contract.
pub trait ChromeShell: Send + Sync {
    /// Starts the shell with the `modes.chrome` options (including `url`).
    fn init(&self, options: &Value) -> Result<(), HostError>;
}

/// Opens URLs in the system's default handler.
pub trait BrowserLauncher: Send + Sync {
    /// Opens `url`.
    fn open(&self, url: &str) -> Result<(), HostError>;
}

/// Blocking user-facing message dialogs.
pub trait Dialog: Send + Sync {
    /// Shows an error message.
    fn show_error(&self, title: &str, message: &str);
}

/// No server: never running, nothing to dispatch to.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoServer {
    /// Port reported to extensions.
    pub port: u16,
}

impl TransportServer for NoServer {
    fn is_running(&self) -> bool {
        false
    }

    fn stop(&self) -> Result<(), HostError> {
        Ok(())
    }

    fn port(&self) -> u16 {
        self.port
    }
}

impl EventDispatcher for NoServer {
    fn dispatch_to_all(&self, _event: &str, _data: &Value) -> Result<usize, HostError> {
        Ok(0)
    }
}

/// No tray icon.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTray;

impl Tray for NoTray {
    fn is_active(&self) -> bool {
        false
    }

    fn remove(&self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Placeholder for builds without a window backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWindow;

impl WindowController for NoWindow {
    fn run(&self, _options: &Value) -> Result<(), HostError> {
        Err(HostError::Unavailable("Native window mode"))
    }

    fn close(&self, _code: i32) -> Result<(), HostError> {
        Err(HostError::Unavailable("Native window mode"))
    }
}

/// Opens URLs with the `open` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), HostError> {
        info!("Opening {} in the default browser", url);
        open::that(url)?;
        Ok(())
    }
}

/// Reports errors through the log and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrDialog;

impl Dialog for StderrDialog {
    fn show_error(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
        eprintln!("{}: {}", title, message);
    }
}

/// The non-transport collaborators used by the host.
#[derive(Clone)]
pub struct HostServices {
    /// Tray icon.
    pub tray: Arc<dyn Tray>,
    /// Native window.
    pub window: Arc<dyn WindowController>,
    /// Embedded chrome shell.
    pub chrome: Arc<dyn ChromeShell>,
    /// Default browser.
    pub browser: Arc<dyn BrowserLauncher>,
    /// Error dialogs.
    pub dialog: Arc<dyn Dialog>,
}

impl HostServices {
    /// Default collaborators. The chrome shell is launched through
    /// `spawner` and tracked in `processes`.
    #[must_use]
    pub fn standard(spawner: Arc<dyn Spawner>, processes: Arc<ProcessTable>) -> Self {
        Self {
            tray: Arc::new(NoTray),
            window: Arc::new(NoWindow),
            chrome: Arc::new(ChromeLauncher::new(spawner, processes)),
            browser: Arc::new(SystemBrowser),
            dialog: Arc::new(StderrDialog),
        }
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
