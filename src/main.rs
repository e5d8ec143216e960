//! apphost - Main entry point.
//!
//! Usage: apphost [OPTIONS]
//!
//! Loads `<path>/apphost.config.json`, starts the control server and the
//! configured extensions, then runs the frontend for the selected mode
//! until shutdown is requested.

use clap::Parser;

use apphost::app::STARTUP_FAILURE_EXIT_CODE;
use apphost::host::{Dialog, StderrDialog};
use apphost::logging::{self, LogConfig};
use apphost::{App, AppOptions, Cli, StartupError};

fn fail(error: &StartupError) -> ! {
    StderrDialog.show_error(error.title(), &error.to_string());
    std::process::exit(STARTUP_FAILURE_EXIT_CODE);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = match cli.load_settings() {
        Ok(settings) => settings,
        Err(e) => fail(&StartupError::Config(e)),
    };

    let log_config = LogConfig::from_settings(&settings, cli.log_level.as_deref());
    if let Err(e) = logging::init(&log_config) {
        fail(&StartupError::Logging(e));
    }

    let app = match App::start(settings, AppOptions::standard()) {
        Ok(app) => app,
        Err(e) => fail(&e),
    };

    app.run();
    Ok(())
}
