//! Host-wide table of spawned child processes.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{ChildHandle, ProcessError, ProcessId};

/// Outcome of a best-effort termination pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of processes termination was requested for.
    pub attempted: usize,
    /// Processes whose termination failed, with the error text.
    pub failures: Vec<(ProcessId, String)>,
}

impl CleanupReport {
    /// Records the result of terminating one process.
    pub fn record(&mut self, id: ProcessId, result: Result<(), ProcessError>) {
        self.attempted += 1;
        if let Err(e) = result {
            debug!("Ignoring termination failure for process {}: {}", id, e);
            self.failures.push((id, e.to_string()));
        }
    }

    /// Returns true if every termination succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Child processes spawned by the host outside the extension manager.
#[derive(Default)]
pub struct ProcessTable {
    entries: Mutex<Vec<Box<dyn ChildHandle>>>,
}

impl ProcessTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Box<dyn ChildHandle>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes ownership of a spawned process.
    pub fn track(&self, handle: Box<dyn ChildHandle>) -> ProcessId {
        let id = handle.id();
        self.entries().push(handle);
        id
    }

    /// Number of tracked processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Terminates every tracked process. Failures are collected, not
    /// propagated, and the table is always left empty.
    pub fn cleanup_all(&self) -> CleanupReport {
        let handles: Vec<_> = std::mem::take(&mut *self.entries());
        let mut report = CleanupReport::default();
        for mut handle in handles {
            let id = handle.id();
            report.record(id, handle.terminate());
        }
        report
    }
}

impl std::fmt::Debug for ProcessTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTable")
            .field("len", &self.len())
            .finish()
    }
}
