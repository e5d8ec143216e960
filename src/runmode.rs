//! Run-mode dispatch.
//!
//! Window mode hands control to the window event loop. The headless modes
//! (browser, cloud, chrome) start their frontend and then block on the
//! shutdown flag.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::config::{RunMode, Settings};
use crate::host::{BrowserLauncher, ChromeShell, HostError, WindowController};
use crate::shutdown::ShutdownState;

/// Starts the frontend for the configured run mode.
pub struct RunModeDispatcher {
    state: Arc<ShutdownState>,
    window: Arc<dyn WindowController>,
    browser: Arc<dyn BrowserLauncher>,
    chrome: Arc<dyn ChromeShell>,
}

impl RunModeDispatcher {
    /// Creates a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        state: Arc<ShutdownState>,
        window: Arc<dyn WindowController>,
        browser: Arc<dyn BrowserLauncher>,
        chrome: Arc<dyn ChromeShell>,
    ) -> Self {
        Self {
            state,
            window,
            browser,
            chrome,
        }
    }

    /// Runs the frontend and returns once the host should shut down.
    ///
    /// Only window mode reports failures; the headless modes log them and
    /// keep waiting, so the control endpoints remain usable.
    ///
    /// # Errors
    /// Returns the window controller error in window mode.
    pub fn run(&self, settings: &Settings, port: u16) -> Result<(), HostError> {
        let url = settings.navigation_url(port);
        match settings.mode() {
            RunMode::Window => {
                let options = Self::options_with_url(settings, &url);
                self.window.run(&options)
            }
            RunMode::Browser => {
                if let Err(e) = self.browser.open(&url) {
                    error!("Unable to open {}: {}", url, e);
                }
                self.state.wait();
                Ok(())
            }
            RunMode::Cloud => {
                if let Some(message) = Self::availability_message(settings, &url) {
                    info!("{}", message);
                }
                self.state.wait();
                Ok(())
            }
            RunMode::Chrome => {
                let options = Self::options_with_url(settings, &url);
                if let Err(e) = self.chrome.init(&options) {
                    error!("Unable to start chrome shell: {}", e);
                }
                self.state.wait();
                Ok(())
            }
        }
    }

    /// Announces the endpoint only when the control server is enabled.
    fn availability_message(settings: &Settings, url: &str) -> Option<String> {
        settings
            .bool_option("enableServer")
            .then(|| format!("{} is available at {}", settings.app_id(), url))
    }

    fn options_with_url(settings: &Settings, url: &str) -> Value {
        let mut options = settings.mode_options();
        if let Value::Object(map) = &mut options {
            map.insert("url".into(), Value::from(url));
        }
        options
    }
}

impl std::fmt::Debug for RunModeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunModeDispatcher").finish_non_exhaustive()
    }
}
