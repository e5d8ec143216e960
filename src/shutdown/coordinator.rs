//! Ordered, idempotent shutdown.
//!
//! Teardown order: extensions, other tracked processes, transport server,
//! tray icon, then window close or process exit. Each step reports its own
//! outcome and a failing step never prevents the next one. A panic anywhere
//! in the sequence turns into an immediate exit with the requested code.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::state::ShutdownState;
use crate::config::RunMode;
use crate::extension::ExtensionManager;
use crate::host::{HostError, NoServer, NoTray, NoWindow, TransportServer, Tray, WindowController};
use crate::process::{ProcessTable, force_kill_current};

/// Pause before exiting so asynchronous cleanup can settle.
pub const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Terminates the current process.
pub trait Terminator: Send + Sync {
    /// Exits with `code`.
    fn terminate(&self, code: i32);

    /// Kills the process without any cleanup.
    fn force_kill(&self) {
        force_kill_current();
    }
}

/// Exits through `std::process::exit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) {
        info!("Exiting with code {}", code);
        std::process::exit(code);
    }
}

/// Teardown steps before the terminal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    Extensions,
    Processes,
    Server,
    Tray,
}

impl fmt::Display for ShutdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownStep::Extensions => "extensions",
            ShutdownStep::Processes => "processes",
            ShutdownStep::Server => "server",
            ShutdownStep::Tray => "tray",
        };
        f.write_str(name)
    }
}

/// Outcome of one teardown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step ran.
    Completed,
    /// Nothing to do.
    Skipped,
    /// The step ran and failed.
    Failed(String),
}

/// Per-step outcomes of one teardown run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    steps: Vec<(ShutdownStep, StepOutcome)>,
}

impl ShutdownReport {
    fn record(&mut self, step: ShutdownStep, outcome: StepOutcome) {
        self.steps.push((step, outcome));
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[(ShutdownStep, StepOutcome)] {
        &self.steps
    }

    /// Returns the outcome of `step`.
    #[must_use]
    pub fn outcome(&self, step: ShutdownStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    fn log(&self) {
        for (step, outcome) in &self.steps {
            match outcome {
                StepOutcome::Completed => debug!("Shutdown step {}: completed", step),
                StepOutcome::Skipped => debug!("Shutdown step {}: skipped", step),
                StepOutcome::Failed(e) => warn!("Shutdown step {} failed: {}", step, e),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running(ThreadId),
    Finished,
}

/// Single entry point for shutting the host down.
pub struct ShutdownCoordinator {
    state: Arc<ShutdownState>,
    extensions: Arc<ExtensionManager>,
    processes: Arc<ProcessTable>,
    server: Arc<dyn TransportServer>,
    tray: Arc<dyn Tray>,
    window: Arc<dyn WindowController>,
    terminator: Arc<dyn Terminator>,
    mode: RunMode,
    grace_period: Duration,
    phase: Mutex<Phase>,
    phase_changed: Condvar,
    exited: AtomicBool,
    last_report: Mutex<Option<ShutdownReport>>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with inert server, tray and window, exiting
    /// through [`ProcessExit`].
    #[must_use]
    pub fn new(
        state: Arc<ShutdownState>,
        extensions: Arc<ExtensionManager>,
        processes: Arc<ProcessTable>,
        mode: RunMode,
    ) -> Self {
        Self {
            state,
            extensions,
            processes,
            server: Arc::new(NoServer::default()),
            tray: Arc::new(NoTray),
            window: Arc::new(NoWindow),
            terminator: Arc::new(ProcessExit),
            mode,
            grace_period: EXIT_GRACE_PERIOD,
            phase: Mutex::new(Phase::Idle),
            phase_changed: Condvar::new(),
            exited: AtomicBool::new(false),
            last_report: Mutex::new(None),
        }
    }

    /// Sets the transport server stopped in step 3.
    #[must_use]
    pub fn with_server(mut self, server: Arc<dyn TransportServer>) -> Self {
        self.server = server;
        self
    }

    /// Sets the tray removed in step 4.
    #[must_use]
    pub fn with_tray(mut self, tray: Arc<dyn Tray>) -> Self {
        self.tray = tray;
        self
    }

    /// Sets the window closed in window mode.
    #[must_use]
    pub fn with_window(mut self, window: Arc<dyn WindowController>) -> Self {
        self.window = window;
        self
    }

    /// Sets how the process is terminated.
    #[must_use]
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Sets the pause before the final exit.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Returns the shared shutdown flag.
    #[must_use]
    pub fn state(&self) -> &Arc<ShutdownState> {
        &self.state
    }

    /// Returns the terminator.
    #[must_use]
    pub fn terminator(&self) -> &Arc<dyn Terminator> {
        &self.terminator
    }

    /// Returns the report of the completed teardown run, if any.
    #[must_use]
    pub fn last_report(&self) -> Option<ShutdownReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shuts the host down and terminates with `code`.
    ///
    /// Safe to call concurrently and repeatedly: only the first call runs
    /// the teardown. Callers on other threads wait for it to finish; a
    /// re-entrant call from the teardown thread returns at once.
    pub fn request_exit(&self, code: i32) {
        self.state.request();
        if !self.begin() {
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_sequence(code)));
        if outcome.is_err() {
            error!("Shutdown sequence panicked, forcing exit with code {}", code);
            self.exit_once(code);
        }

        *self.phase() = Phase::Finished;
        self.phase_changed.notify_all();
    }

    /// Claims the teardown for the current thread.
    fn begin(&self) -> bool {
        let me = thread::current().id();
        let mut phase = self.phase();
        loop {
            match *phase {
                Phase::Idle => {
                    *phase = Phase::Running(me);
                    return true;
                }
                Phase::Running(owner) if owner == me => {
                    debug!("Re-entrant exit request ignored");
                    return false;
                }
                Phase::Running(_) => {
                    phase = self
                        .phase_changed
                        .wait(phase)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Phase::Finished => return false,
            }
        }
    }

    fn run_sequence(&self, code: i32) {
        info!("Shutting down (exit code {})", code);

        let mut report = ShutdownReport::default();
        report.record(ShutdownStep::Extensions, self.cleanup_extensions());
        report.record(ShutdownStep::Processes, self.cleanup_processes());
        report.record(ShutdownStep::Server, Self::outcome(self.stop_server()));
        report.record(ShutdownStep::Tray, Self::outcome(self.remove_tray()));
        report.log();
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);

        if self.mode == RunMode::Window {
            if self.exited.load(Ordering::SeqCst) {
                return;
            }
            // `exited` is only set once close returns, so a panicking close
            // still reaches the terminator.
            match self.window.close(code) {
                Ok(()) => self.exited.store(true, Ordering::SeqCst),
                Err(e) => {
                    warn!("Window close failed: {}", e);
                    self.exit_once(code);
                }
            }
        } else {
            thread::sleep(self.grace_period);
            self.exit_once(code);
        }
    }

    fn outcome(result: Result<bool, HostError>) -> StepOutcome {
        match result {
            Ok(true) => StepOutcome::Completed,
            Ok(false) => StepOutcome::Skipped,
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    fn cleanup_extensions(&self) -> StepOutcome {
        if !self.extensions.is_initialized() {
            return StepOutcome::Skipped;
        }
        // Individual termination failures are logged by the report.
        self.extensions.cleanup();
        StepOutcome::Completed
    }

    fn cleanup_processes(&self) -> StepOutcome {
        if self.processes.is_empty() {
            return StepOutcome::Skipped;
        }
        self.processes.cleanup_all();
        StepOutcome::Completed
    }

    fn stop_server(&self) -> Result<bool, HostError> {
        if !self.server.is_running() {
            return Ok(false);
        }
        self.server.stop()?;
        Ok(true)
    }

    fn remove_tray(&self) -> Result<bool, HostError> {
        if !self.tray.is_active() {
            return Ok(false);
        }
        self.tray.remove()?;
        Ok(true)
    }

    fn exit_once(&self, code: i32) {
        if !self.exited.swap(true, Ordering::SeqCst) {
            self.terminator.terminate(code);
        }
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("mode", &self.mode)
            .field("phase", &*self.phase())
            .finish_non_exhaustive()
    }
}
