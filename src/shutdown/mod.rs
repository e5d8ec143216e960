//! Shutdown handling.
//!
//! - [`ShutdownState`]: the one-way shutdown flag and the wait primitive
//!   headless run modes block on.
//! - [`ShutdownCoordinator`]: the ordered teardown sequence.
//! - [`SignalListener`]: turns termination signals into a shutdown.

pub mod coordinator;
pub mod signals;
pub mod state;

pub use coordinator::{
    EXIT_GRACE_PERIOD, ProcessExit, ShutdownCoordinator, ShutdownReport, ShutdownStep,
    StepOutcome, Terminator,
};
pub use signals::SignalListener;
pub use state::{ShutdownState, WAIT_POLL_INTERVAL};
