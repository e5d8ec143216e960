//! Extension process manager.
//!
//! Spawns configured extensions, hands them their bootstrap payload, and
//! terminates them on cleanup.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::ExtensionError;
use super::bootstrap::BootstrapPayload;
use super::registry::{ExtensionRecord, ExtensionRegistry, TrackedProcess};
use crate::auth::AuthProvider;
use crate::config::{Settings, substitute_app_path};
use crate::process::{CleanupReport, OutputSinks, Spawner, os_name};
use crate::shutdown::ShutdownState;

/// Manager for extension processes.
///
/// Two states: uninitialized and initialized. `init` populates the
/// registry, `cleanup` always converges it back to empty.
pub struct ExtensionManager {
    registry: Mutex<ExtensionRegistry>,
    spawner: Arc<dyn Spawner>,
    auth: Arc<dyn AuthProvider>,
    sinks: OutputSinks,
    shutdown: Option<Arc<ShutdownState>>,
}

impl ExtensionManager {
    /// Creates a manager that forwards extension output to the host's own
    /// stdout/stderr.
    #[must_use]
    pub fn new(spawner: Arc<dyn Spawner>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            registry: Mutex::new(ExtensionRegistry::new()),
            spawner,
            auth,
            sinks: OutputSinks::inherit(),
            shutdown: None,
        }
    }

    /// Replaces the output sinks given to spawned extensions.
    #[must_use]
    pub fn with_sinks(mut self, sinks: OutputSinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Makes `init` a no-op once `state` reports a shutdown request.
    #[must_use]
    pub fn with_shutdown_state(mut self, state: Arc<ShutdownState>) -> Self {
        self.shutdown = Some(state);
        self
    }

    fn registry(&self) -> MutexGuard<'_, ExtensionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the `extensions` option and loads every entry.
    ///
    /// Entries without an id are skipped. Entries with a command are
    /// spawned and bootstrapped; a failure there is logged and does not
    /// affect the others. Every entry is marked loaded. Returns the number
    /// of loaded extensions.
    ///
    /// Nothing is spawned once shutdown has been requested. The check runs
    /// under the registry lock, so a concurrent teardown either sees the
    /// populated registry or this call sees the request.
    pub fn init(&self, settings: &Settings, server_port: u16) -> usize {
        let mut registry = self.registry();
        if registry.is_initialized() {
            debug!("Extensions already initialized");
            return registry.loaded_ids().len();
        }
        if self.shutdown.as_ref().is_some_and(|s| s.is_requested()) {
            info!("Shutdown requested, not starting extensions");
            return 0;
        }

        let entries = Self::configured_extensions(settings);
        info!("Initializing {} extension(s)", entries.len());

        for record in entries {
            let id = record.id.clone();
            if let Some(command) = &record.command {
                match self.spawn_extension(&id, command, server_port) {
                    Ok(process) => registry.track(process),
                    Err(e) => warn!("{}", e),
                }
            }

            registry.register(record);
            registry.mark_loaded(&id);
        }

        registry.mark_initialized();
        registry.loaded_ids().len()
    }

    /// Parses the configured extension list for the current platform.
    #[must_use]
    pub fn configured_extensions(settings: &Settings) -> Vec<ExtensionRecord> {
        let Some(list) = settings.option_for_mode("extensions").and_then(Value::as_array) else {
            return Vec::new();
        };

        let os_key = format!("command{}", os_name());
        list.iter()
            .filter_map(|entry| Self::parse_entry(entry, &os_key, settings.app_path()))
            .collect()
    }

    fn parse_entry(entry: &Value, os_key: &str, app_path: &Path) -> Option<ExtensionRecord> {
        let Some(id) = entry.get("id").and_then(Value::as_str) else {
            debug!("Skipping extension entry without an id");
            return None;
        };

        let command = entry
            .get(os_key)
            .and_then(Value::as_str)
            .or_else(|| entry.get("command").and_then(Value::as_str))
            .map(|command| substitute_app_path(command, app_path));

        Some(ExtensionRecord::new(id, command))
    }

    fn spawn_extension(
        &self,
        id: &str,
        command: &str,
        server_port: u16,
    ) -> Result<TrackedProcess, ExtensionError> {
        let payload = BootstrapPayload::build(id, server_port, self.auth.as_ref()).map_err(
            |source| ExtensionError::Bootstrap {
                id: id.to_string(),
                source,
            },
        )?;
        let input = payload.to_json()?;

        let handle = self
            .spawner
            .spawn(command, self.sinks.clone())
            .map_err(|source| ExtensionError::Spawn {
                id: id.to_string(),
                source,
            })?;

        let mut process = TrackedProcess::new(handle, self.sinks.clone());
        if let Err(e) = process.deliver_input(input.as_bytes()) {
            // The process may have exited already; it stays tracked.
            warn!("Failed to deliver bootstrap payload to '{}': {}", id, e);
        }

        info!("Started extension '{}' as process {}", id, process.process_id);
        Ok(process)
    }

    /// Returns true if `id` is loaded. Callable in any state.
    #[must_use]
    pub fn is_loaded(&self, id: &str) -> bool {
        self.registry().is_loaded(id)
    }

    /// Returns loaded extension ids in insertion order.
    #[must_use]
    pub fn get_loaded(&self) -> Vec<String> {
        self.registry().loaded_ids()
    }

    /// Returns true between `init` and `cleanup`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.registry().is_initialized()
    }

    /// Number of tracked extension processes.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.registry().tracked_count()
    }

    /// Terminates every extension process and empties the registry.
    ///
    /// Termination failures are collected in the report, never propagated.
    /// A no-op when uninitialized.
    pub fn cleanup(&self) -> CleanupReport {
        let mut registry = self.registry();
        if !registry.is_initialized() && registry.tracked_count() == 0 {
            return CleanupReport::default();
        }

        let report = registry.drain();
        info!(
            "Extensions cleaned up ({} process(es), {} failure(s))",
            report.attempted,
            report.failures.len()
        );
        report
    }
}

impl std::fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionManager")
            .field("registry", &*self.registry())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::BasicAuth;
    use crate::process::ShellSpawner;
    use serde_json::json;
    use std::path::PathBuf;

    fn settings(extensions: Value) -> Settings {
        Settings::from_document(
            json!({"defaultMode": "cloud", "extensions": extensions}),
            PathBuf::from("/opt/app"),
        )
        .unwrap()
    }

    fn manager() -> ExtensionManager {
        ExtensionManager::new(
            Arc::new(ShellSpawner::new()),
            Arc::new(BasicAuth::with_tokens("t", "c")),
        )
        .with_sinks(OutputSinks::discard())
    }

    #[test]
    fn test_configured_extensions_substitutes_path() {
        let records = ExtensionManager::configured_extensions(&settings(json!([
            {"id": "a", "command": "node ${NL_PATH}/a.js"},
            {"command": "orphan"},
            {"id": 5},
            {"id": "b"}
        ])));

        assert_eq!(
            records,
            vec![
                ExtensionRecord::new("a", Some("node /opt/app/a.js".to_string())),
                ExtensionRecord::new("b", None),
            ]
        );
    }

    #[test]
    fn test_os_specific_command_wins() {
        let os_key = format!("command{}", os_name());
        let mut entry = json!({"id": "a", "command": "generic"});
        entry[os_key.as_str()] = json!("specific ${NL_PATH}");

        let records = ExtensionManager::configured_extensions(&settings(json!([entry])));
        assert_eq!(records[0].command.as_deref(), Some("specific /opt/app"));
    }

    #[test]
    fn test_missing_extension_list() {
        let s = Settings::from_document(json!({}), PathBuf::new()).unwrap();
        let m = manager();
        assert_eq!(m.init(&s, 0), 0);
        assert!(m.is_initialized());
        assert!(m.get_loaded().is_empty());
    }

    #[test]
    fn test_cleanup_when_uninitialized_is_noop() {
        let m = manager();
        assert_eq!(m.cleanup(), CleanupReport::default());
        assert!(!m.is_initialized());
    }

    #[cfg(unix)]
    #[test]
    fn test_real_extension_lifecycle() {
        let m = manager();
        let s = settings(json!([{"id": "sleeper", "command": "sleep 30"}]));

        assert_eq!(m.init(&s, 1234), 1);
        assert_eq!(m.tracked_count(), 1);
        assert!(m.is_loaded("sleeper"));

        let report = m.cleanup();
        assert_eq!(report.attempted, 1);
        assert!(report.is_clean());
        assert_eq!(m.tracked_count(), 0);
        assert!(!m.is_loaded("sleeper"));
    }
}
