//! Shell-based process spawner.
//!
//! Runs command strings through the platform shell (`/bin/sh -c` or
//! `cmd /C`) so configured commands may carry arguments and quoting.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tracing::{debug, info, warn};

use super::{ChildHandle, OutputSink, OutputSinks, ProcessError, ProcessId, Spawner};

/// Size of a single forwarded output chunk.
const FORWARD_CHUNK_SIZE: usize = 4096;

/// Spawns commands through the platform shell.
#[derive(Debug)]
pub struct ShellSpawner {
    next_id: AtomicU64,
}

impl Default for ShellSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellSpawner {
    /// Creates a new spawner. Virtual ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    #[cfg(windows)]
    fn shell_command(command: &str) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }

    /// The shell leads its own process group so termination reaches
    /// everything it started.
    #[cfg(not(windows))]
    fn shell_command(command: &str) -> Command {
        use std::os::unix::process::CommandExt;

        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", command]);
        cmd.process_group(0);
        cmd
    }
}

impl Spawner for ShellSpawner {
    fn spawn(
        &self,
        command: &str,
        sinks: OutputSinks,
    ) -> Result<Box<dyn ChildHandle>, ProcessError> {
        let mut cmd = Self::shell_command(command);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(stdout) = child.stdout.take() {
            forward_output(id, "stdout", stdout, sinks.stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(id, "stderr", stderr, sinks.stderr);
        }
        let stdin = child.stdin.take();

        info!("Spawned process {} (pid {}): {}", id, child.id(), command);

        Ok(Box::new(ShellChild {
            id,
            child,
            stdin,
            reaped: false,
        }))
    }
}

/// Pumps a child stream into a sink on a dedicated reader thread.
fn forward_output<R>(id: ProcessId, stream: &'static str, mut reader: R, sink: OutputSink)
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("proc-{}-{}", id, stream))
        .spawn(move || {
            let mut buf = [0u8; FORWARD_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => sink(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("Process {} {} closed: {}", id, stream, e);
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Failed to start {} forwarder for process {}: {}", stream, id, e);
    }
}

/// Sends SIGKILL to the process group led by `child`.
///
/// Only valid while `child` is unreaped, since the pid keeps the group id
/// reserved until then.
#[cfg(unix)]
fn kill_process_group(id: ProcessId, child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };

    // SAFETY: killpg(2) has no memory-safety preconditions.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH | libc::EPERM) => {
                debug!("Process group of {} already exited", id);
            }
            _ => warn!("Failed to kill process group of {}: {}", id, err),
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_id: ProcessId, _child: &Child) {}

/// A child started by [`ShellSpawner`].
struct ShellChild {
    id: ProcessId,
    child: Child,
    stdin: Option<ChildStdin>,
    reaped: bool,
}

impl ChildHandle for ShellChild {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn write_input(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        let id = self.id;
        let stdin = self.stdin.as_mut().ok_or(ProcessError::InputClosed(id))?;
        stdin
            .write_all(bytes)
            .and_then(|()| stdin.flush())
            .map_err(|source| ProcessError::Io { id, source })
    }

    fn close_input(&mut self) -> Result<(), ProcessError> {
        // Dropping the pipe delivers EOF to the child.
        self.stdin.take();
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        let id = self.id;
        self.stdin.take();
        if self.reaped {
            return Ok(());
        }

        // Reaches background and pipeline children even after the shell
        // itself has exited.
        kill_process_group(id, &self.child);

        if let Ok(Some(status)) = self.child.try_wait() {
            self.reaped = true;
            debug!("Process {} already exited with {}", id, status);
            return Ok(());
        }

        self.child
            .kill()
            .map_err(|source| ProcessError::Terminate { id, source })?;
        self.child
            .wait()
            .map_err(|source| ProcessError::Terminate { id, source })?;
        self.reaped = true;
        info!("Terminated process {}", id);
        Ok(())
    }
}
