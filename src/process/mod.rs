//! Child process management.
//!
//! Provides the platform-neutral spawning capability used by the extension
//! manager and the chrome launcher, plus the host-wide table of child
//! processes that are not owned by the extension manager.

mod platform;
mod shell;
mod table;

pub use platform::{FORCE_KILL_EXIT_CODE, force_kill_current, os_name};
pub use shell::ShellSpawner;
pub use table::{CleanupReport, ProcessTable};

use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;

/// Opaque process identifier assigned by a spawner.
///
/// This is a virtual id, not the OS pid.
pub type ProcessId = u64;

/// Receives one chunk of output from a child process.
pub type OutputSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Process errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command could not be started.
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The input channel was already closed.
    #[error("Input channel of process {0} is closed")]
    InputClosed(ProcessId),

    /// Reading from or writing to the process failed.
    #[error("I/O error on process {id}: {source}")]
    Io {
        id: ProcessId,
        #[source]
        source: io::Error,
    },

    /// The process could not be terminated.
    #[error("Failed to terminate process {id}: {source}")]
    Terminate {
        id: ProcessId,
        #[source]
        source: io::Error,
    },
}

/// Destinations for a child's standard output and standard error.
#[derive(Clone)]
pub struct OutputSinks {
    /// Receives stdout chunks.
    pub stdout: OutputSink,
    /// Receives stderr chunks.
    pub stderr: OutputSink,
}

impl OutputSinks {
    /// Forwards child output to the host's own stdout/stderr, flushing
    /// after every chunk.
    #[must_use]
    pub fn inherit() -> Self {
        Self {
            stdout: Arc::new(|bytes: &[u8]| {
                let mut out = io::stdout().lock();
                let _ = out.write_all(bytes);
                let _ = out.flush();
            }),
            stderr: Arc::new(|bytes: &[u8]| {
                let mut err = io::stderr().lock();
                let _ = err.write_all(bytes);
                let _ = err.flush();
            }),
        }
    }

    /// Drops all output.
    #[must_use]
    pub fn discard() -> Self {
        Self {
            stdout: Arc::new(|_: &[u8]| {}),
            stderr: Arc::new(|_: &[u8]| {}),
        }
    }
}

impl std::fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSinks").finish_non_exhaustive()
    }
}

/// Handle to a spawned child process.
pub trait ChildHandle: Send {
    /// Returns the virtual id assigned at spawn time.
    fn id(&self) -> ProcessId;

    /// Writes bytes to the child's standard input.
    fn write_input(&mut self, bytes: &[u8]) -> Result<(), ProcessError>;

    /// Closes the child's standard input (end-of-input).
    fn close_input(&mut self) -> Result<(), ProcessError>;

    /// Requests termination of the child.
    fn terminate(&mut self) -> Result<(), ProcessError>;
}

/// Capability to launch a command string as a child process.
pub trait Spawner: Send + Sync {
    /// Spawns `command` with its output forwarded to `sinks`.
    fn spawn(
        &self,
        command: &str,
        sinks: OutputSinks,
    ) -> Result<Box<dyn ChildHandle>, ProcessError>;
}
