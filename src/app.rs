//! Application startup and run loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, ControlHandler, ControlServer, ProcessIo};
use crate::auth::{AuthProvider, BasicAuth, export_auth_info};
use crate::config::{ConfigError, Settings};
use crate::extension::ExtensionManager;
use crate::host::{EventDispatcher, HostError, HostServices, NoServer, TransportServer};
use crate::process::{OutputSinks, ProcessTable, ShellSpawner, Spawner};
use crate::runmode::RunModeDispatcher;
use crate::shutdown::{
    EXIT_GRACE_PERIOD, ProcessExit, ShutdownCoordinator, ShutdownState, SignalListener,
    Terminator,
};

/// Exit code for unrecoverable startup failures.
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 1;

/// Unrecoverable startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The configuration could not be loaded.
    #[error("The application configuration file cannot be loaded: {0}")]
    Config(#[from] ConfigError),

    /// The control server could not bind its port.
    #[error("The application server cannot be initialized on port {port}: {source}")]
    Server {
        port: u16,
        #[source]
        source: ApiError,
    },

    /// Logging could not be initialized.
    #[error("Logging cannot be initialized: {0}")]
    Logging(#[source] std::io::Error),

    /// Signal handlers could not be installed.
    #[error("Signal handlers cannot be installed: {0}")]
    Signals(#[source] std::io::Error),

    /// A host collaborator failed to start.
    #[error("{0}")]
    Host(#[from] HostError),
}

impl StartupError {
    /// Dialog title for this failure.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            StartupError::Config(_) => "Unable to load configuration",
            StartupError::Server { .. } => "Unable to start server",
            StartupError::Logging(_) => "Unable to initialize logging",
            StartupError::Signals(_) => "Unable to install signal handlers",
            StartupError::Host(_) => "Unable to start application",
        }
    }
}

/// Replaceable parts of the host.
pub struct AppOptions {
    /// Spawner used for extensions and the chrome shell.
    pub spawner: Arc<dyn Spawner>,
    /// Host-wide table of non-extension child processes.
    pub processes: Arc<ProcessTable>,
    /// Tray, window, chrome, browser and dialog collaborators.
    pub host: HostServices,
    /// Token provider.
    pub auth: Arc<dyn AuthProvider>,
    /// How the process terminates.
    pub terminator: Arc<dyn Terminator>,
    /// Streams used by the stdio control endpoints.
    pub io: ProcessIo,
    /// Destinations for extension output.
    pub extension_sinks: OutputSinks,
    /// Pause before the final exit.
    pub grace_period: Duration,
    /// Whether to install the process-wide signal listener.
    pub install_signals: bool,
}

impl AppOptions {
    /// The production configuration.
    #[must_use]
    pub fn standard() -> Self {
        let spawner: Arc<dyn Spawner> = Arc::new(ShellSpawner::new());
        let processes = Arc::new(ProcessTable::new());
        Self {
            host: HostServices::standard(Arc::clone(&spawner), Arc::clone(&processes)),
            spawner,
            processes,
            auth: Arc::new(BasicAuth::generate()),
            terminator: Arc::new(ProcessExit),
            io: ProcessIo::standard(),
            extension_sinks: OutputSinks::inherit(),
            grace_period: EXIT_GRACE_PERIOD,
            install_signals: true,
        }
    }
}

impl std::fmt::Debug for AppOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppOptions")
            .field("install_signals", &self.install_signals)
            .finish_non_exhaustive()
    }
}

/// A started host.
pub struct App {
    settings: Settings,
    port: u16,
    state: Arc<ShutdownState>,
    extensions: Arc<ExtensionManager>,
    server: Option<Arc<ControlServer>>,
    coordinator: Arc<ShutdownCoordinator>,
    auth: Arc<dyn AuthProvider>,
    host: HostServices,
    signals: Option<SignalListener>,
}

impl App {
    /// Runs the startup sequence.
    ///
    /// # Errors
    /// Returns a startup-fatal error if the server cannot bind or the
    /// signal listener cannot be installed.
    pub fn start(settings: Settings, options: AppOptions) -> Result<Self, StartupError> {
        let AppOptions {
            spawner,
            processes,
            host,
            auth,
            terminator,
            io,
            extension_sinks,
            grace_period,
            install_signals,
        } = options;

        let state = Arc::new(ShutdownState::new());
        let extensions = Arc::new(
            ExtensionManager::new(spawner, Arc::clone(&auth))
                .with_sinks(extension_sinks)
                .with_shutdown_state(Arc::clone(&state)),
        );

        let server = if settings.bool_option("enableServer") {
            let port = settings.port();
            let server = ControlServer::bind(port)
                .map_err(|source| StartupError::Server { port, source })?;
            Some(Arc::new(server))
        } else {
            None
        };
        let port = server
            .as_ref()
            .map_or_else(|| settings.port(), |s| TransportServer::port(s.as_ref()));

        let (transport, events) = match &server {
            Some(server) => (
                Arc::clone(server) as Arc<dyn TransportServer>,
                Arc::clone(server) as Arc<dyn EventDispatcher>,
            ),
            None => {
                let inert = Arc::new(NoServer { port });
                (
                    Arc::clone(&inert) as Arc<dyn TransportServer>,
                    inert as Arc<dyn EventDispatcher>,
                )
            }
        };

        let coordinator = Arc::new(
            ShutdownCoordinator::new(
                Arc::clone(&state),
                Arc::clone(&extensions),
                processes,
                settings.mode(),
            )
            .with_server(transport)
            .with_tray(Arc::clone(&host.tray))
            .with_window(Arc::clone(&host.window))
            .with_terminator(terminator)
            .with_grace_period(grace_period),
        );

        let signals = if install_signals {
            Some(SignalListener::install(Arc::clone(&coordinator)).map_err(StartupError::Signals)?)
        } else {
            None
        };

        if let Some(server) = &server {
            let handler = ControlHandler::new(
                Arc::clone(&coordinator),
                Arc::clone(&extensions),
                events,
                Arc::clone(&auth),
                settings.document().clone(),
            )
            .with_io(io);
            server
                .start(Arc::new(handler))
                .map_err(|source| StartupError::Server { port, source })?;
        }

        if settings.bool_option("exportAuthInfo") {
            if let Err(e) = export_auth_info(settings.app_path(), port, auth.as_ref()) {
                warn!("{}", e);
            }
        }

        if settings.bool_option("enableExtensions") {
            extensions.init(&settings, port);
        }

        info!(
            "{} started in {} mode on port {}",
            settings.app_id(),
            settings.mode(),
            port
        );

        Ok(Self {
            settings,
            port,
            state,
            extensions,
            server,
            coordinator,
            auth,
            host,
            signals,
        })
    }

    /// Runs the frontend until shutdown is requested, then shuts down with
    /// exit code 0.
    ///
    /// A window-mode failure is shown through the dialog and shuts down
    /// with exit code 1.
    pub fn run(&self) {
        let dispatcher = RunModeDispatcher::new(
            Arc::clone(&self.state),
            Arc::clone(&self.host.window),
            Arc::clone(&self.host.browser),
            Arc::clone(&self.host.chrome),
        );

        if let Err(e) = dispatcher.run(&self.settings, self.port) {
            let error = StartupError::Host(e);
            self.host.dialog.show_error(error.title(), &error.to_string());
            self.coordinator.request_exit(STARTUP_FAILURE_EXIT_CODE);
            return;
        }

        self.coordinator.request_exit(0);
    }

    /// Returns the effective port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the loaded settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the configuration document.
    #[must_use]
    pub fn config(&self) -> &Value {
        self.settings.document()
    }

    /// Returns the shutdown flag.
    #[must_use]
    pub fn state(&self) -> &Arc<ShutdownState> {
        &self.state
    }

    /// Returns the extension manager.
    #[must_use]
    pub fn extensions(&self) -> &Arc<ExtensionManager> {
        &self.extensions
    }

    /// Returns the shutdown coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    /// Returns the control server, if enabled.
    #[must_use]
    pub fn server(&self) -> Option<&Arc<ControlServer>> {
        self.server.as_ref()
    }

    /// Returns the token provider.
    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Returns true if the signal listener is installed.
    #[must_use]
    pub fn has_signal_listener(&self) -> bool {
        self.signals.is_some()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("mode", &self.settings.mode())
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
