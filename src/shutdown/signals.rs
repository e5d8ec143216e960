//! OS signal listener.
//!
//! Signals are received through tokio's signal streams on a dedicated
//! `signal-listener` thread, so the OS-level handler only records the
//! signal and the teardown itself runs on an ordinary thread.
//!
//! SIGPIPE needs no registration: the Rust runtime sets it to ignored
//! before `main` runs.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use super::coordinator::ShutdownCoordinator;

/// Guards against registering the listener twice in one process.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Background listener that triggers shutdown on the first termination
/// request.
#[derive(Debug)]
pub struct SignalListener {
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Registers the platform signal set and starts the listener thread.
    ///
    /// Registration completes before this returns, so a signal arriving
    /// afterwards is never lost.
    ///
    /// # Errors
    /// Returns `AlreadyExists` on a second call, or the registration error.
    pub fn install(coordinator: Arc<ShutdownCoordinator>) -> io::Result<Self> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "signal listener already installed",
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let mut signals = {
            let _guard = runtime.enter();
            platform::TerminationSignals::register()?
        };

        let thread = thread::Builder::new()
            .name("signal-listener".into())
            .spawn(move || {
                let Some(name) = runtime.block_on(signals.recv()) else {
                    error!("Signal streams closed");
                    return;
                };
                info!("Received {}, shutting down", name);
                coordinator.request_exit(0);
            })?;

        Ok(Self {
            thread: Some(thread),
        })
    }

    /// Returns true once the listener thread has handled its signal.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

#[cfg(unix)]
mod platform {
    use std::io;

    use tokio::signal::unix::{Signal, SignalKind, signal};

    /// SIGINT and SIGTERM.
    pub struct TerminationSignals {
        interrupt: Signal,
        terminate: Signal,
    }

    impl TerminationSignals {
        pub fn register() -> io::Result<Self> {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        pub async fn recv(&mut self) -> Option<&'static str> {
            tokio::select! {
                r = self.interrupt.recv() => r.map(|()| "SIGINT"),
                r = self.terminate.recv() => r.map(|()| "SIGTERM"),
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::io;

    use tokio::signal::windows::{
        CtrlBreak, CtrlC, CtrlClose, CtrlShutdown, ctrl_break, ctrl_c, ctrl_close, ctrl_shutdown,
    };

    /// Ctrl-C, Ctrl-Break, console close and system shutdown.
    pub struct TerminationSignals {
        ctrl_c: CtrlC,
        ctrl_break: CtrlBreak,
        close: CtrlClose,
        shutdown: CtrlShutdown,
    }

    impl TerminationSignals {
        pub fn register() -> io::Result<Self> {
            Ok(Self {
                ctrl_c: ctrl_c()?,
                ctrl_break: ctrl_break()?,
                close: ctrl_close()?,
                shutdown: ctrl_shutdown()?,
            })
        }

        pub async fn recv(&mut self) -> Option<&'static str> {
            tokio::select! {
                r = self.ctrl_c.recv() => r.map(|()| "CTRL_C_EVENT"),
                r = self.ctrl_break.recv() => r.map(|()| "CTRL_BREAK_EVENT"),
                r = self.close.recv() => r.map(|()| "CTRL_CLOSE_EVENT"),
                r = self.shutdown.recv() => r.map(|()| "CTRL_SHUTDOWN_EVENT"),
            }
        }
    }
}
