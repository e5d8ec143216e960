//! apphost
//!
//! Process-lifecycle and extension-orchestration core of a native
//! application host.
//!
//! # Architecture
//!
//! - **Extension Module**: spawns configured extensions and hands them a
//!   bootstrap payload (port and tokens) on stdin
//! - **Shutdown Module**: ordered, idempotent teardown plus the signal
//!   listener and the wait primitive
//! - **Run Mode**: window, browser, cloud or chrome frontend
//! - **API Module**: loopback control endpoints (exit, kill, broadcast, stdio)
//!
//! # Usage
//!
//! ```no_run
//! use apphost::{App, AppOptions, Cli};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! let settings = cli.load_settings().expect("config");
//! let app = App::start(settings, AppOptions::standard()).expect("startup");
//! app.run();
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod api;
pub mod app;
pub mod auth;
pub mod chrome;
pub mod config;
pub mod extension;
pub mod host;
pub mod logging;
pub mod process;
pub mod runmode;
pub mod shutdown;

// Re-export main types
pub use app::{App, AppOptions, StartupError};
pub use auth::{AuthProvider, BasicAuth};
pub use config::{Cli, RunMode, Settings};
pub use extension::ExtensionManager;
pub use runmode::RunModeDispatcher;
pub use shutdown::{ShutdownCoordinator, ShutdownState, SignalListener};
