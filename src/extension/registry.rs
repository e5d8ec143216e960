//! Extension registry.
//!
//! Holds configured extensions in insertion order together with the child
//! processes spawned for them.

use crate::process::{ChildHandle, CleanupReport, OutputSink, OutputSinks, ProcessError, ProcessId};

/// One configured extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    /// Stable extension id.
    pub id: String,
    /// Launch command with `${NL_PATH}` already substituted.
    pub command: Option<String>,
    /// Whether the extension is loaded.
    pub loaded: bool,
}

impl ExtensionRecord {
    /// Creates an unloaded record.
    #[must_use]
    pub fn new(id: impl Into<String>, command: Option<String>) -> Self {
        Self {
            id: id.into(),
            command,
            loaded: false,
        }
    }
}

/// A spawned extension process.
pub struct TrackedProcess {
    /// Virtual id assigned by the spawner.
    pub process_id: ProcessId,
    /// Where the process's stdout is forwarded.
    pub stdout_sink: OutputSink,
    /// Where the process's stderr is forwarded.
    pub stderr_sink: OutputSink,
    handle: Box<dyn ChildHandle>,
}

impl TrackedProcess {
    /// Wraps a spawned handle with the sinks it was spawned with.
    #[must_use]
    pub fn new(handle: Box<dyn ChildHandle>, sinks: OutputSinks) -> Self {
        Self {
            process_id: handle.id(),
            stdout_sink: sinks.stdout,
            stderr_sink: sinks.stderr,
            handle,
        }
    }

    /// Writes the bootstrap bytes and signals end-of-input.
    pub fn deliver_input(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        self.handle.write_input(bytes)?;
        self.handle.close_input()
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        self.handle.terminate()
    }
}

impl std::fmt::Debug for TrackedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedProcess")
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

/// Extensions by id plus their tracked processes.
///
/// `initialized` is true iff the registry has been populated and not yet
/// drained.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    records: Vec<ExtensionRecord>,
    tracked: Vec<TrackedProcess>,
    initialized: bool,
}

impl ExtensionRegistry {
    /// Creates an empty, uninitialized registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the registry is initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Marks the registry as populated.
    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Registers a record. An id already present keeps its first record.
    pub fn register(&mut self, record: ExtensionRecord) {
        if self.record(&record.id).is_none() {
            self.records.push(record);
        }
    }

    /// Marks an extension as loaded, registering it if needed.
    pub fn mark_loaded(&mut self, id: &str) {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => record.loaded = true,
            None => self.records.push(ExtensionRecord {
                id: id.to_string(),
                command: None,
                loaded: true,
            }),
        }
    }

    /// Returns the record for `id`.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<&ExtensionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Returns true if `id` is loaded.
    #[must_use]
    pub fn is_loaded(&self, id: &str) -> bool {
        self.record(id).is_some_and(|r| r.loaded)
    }

    /// Returns loaded ids in insertion order.
    #[must_use]
    pub fn loaded_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.loaded)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Takes ownership of a spawned extension process.
    pub fn track(&mut self, process: TrackedProcess) {
        self.tracked.push(process);
    }

    /// Number of tracked processes.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Terminates every tracked process (best-effort) and resets the
    /// registry to empty and uninitialized.
    pub fn drain(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for mut process in self.tracked.drain(..) {
            let id = process.process_id;
            report.record(id, process.terminate());
        }
        self.records.clear();
        self.initialized = false;
        report
    }
}
