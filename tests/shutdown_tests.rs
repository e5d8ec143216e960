//! Integration tests for the shutdown path.
//!
//! These tests verify:
//! - Teardown order across extensions, processes, server and tray
//! - Exactly one terminal exit under concurrent requests
//! - The wait primitive wakes promptly

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use apphost::RunMode;
use apphost::process::OutputSinks;
use apphost::process::Spawner;
use apphost::shutdown::{ShutdownState, ShutdownStep, StepOutcome, WAIT_POLL_INTERVAL};

use helpers::{Fixture, RecordingTerminator, settings};

// ============================================================================
// Ordered teardown
// ============================================================================

mod ordering_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_teardown_order() {
        let fx = Fixture::new(RunMode::Cloud);
        fx.extensions.init(
            &settings(json!({"extensions": [{"id": "ext", "command": "ext-cmd"}]})),
            4000,
        );
        let chrome = fx
            .spawner
            .spawn("chrome-cmd", OutputSinks::discard())
            .unwrap();
        fx.processes.track(chrome);

        fx.coordinator.request_exit(0);

        assert_eq!(
            fx.log.entries(),
            vec![
                "spawn:ext-cmd",
                "spawn:chrome-cmd",
                "terminate:ext-cmd",
                "terminate:chrome-cmd",
                "server-stop",
                "tray-remove",
                "exit:0",
            ]
        );
        assert!(!fx.extensions.is_initialized());
        assert!(fx.processes.is_empty());
    }

    #[test]
    fn test_report_records_each_step() {
        let fx = Fixture::new(RunMode::Browser);
        fx.coordinator.request_exit(5);

        let report = fx.coordinator.last_report().unwrap();
        assert_eq!(
            report.outcome(ShutdownStep::Extensions),
            Some(&StepOutcome::Skipped)
        );
        assert_eq!(
            report.outcome(ShutdownStep::Processes),
            Some(&StepOutcome::Skipped)
        );
        assert_eq!(
            report.outcome(ShutdownStep::Server),
            Some(&StepOutcome::Completed)
        );
        assert_eq!(
            report.outcome(ShutdownStep::Tray),
            Some(&StepOutcome::Completed)
        );
        assert_eq!(fx.terminator.codes(), vec![5]);
    }

    #[test]
    fn test_failed_termination_does_not_block_later_steps() {
        let fx = Fixture::new(RunMode::Cloud);
        fx.extensions.init(
            &settings(json!({"extensions": [{"id": "s", "command": "stubborn"}]})),
            4000,
        );

        fx.coordinator.request_exit(0);

        let entries = fx.log.entries();
        assert!(entries.contains(&"server-stop".to_string()));
        assert!(entries.contains(&"tray-remove".to_string()));
        assert_eq!(fx.terminator.codes(), vec![0]);
        assert_eq!(fx.extensions.tracked_count(), 0);
    }

    #[test]
    fn test_extensions_not_started_after_exit_request() {
        let fx = Fixture::new(RunMode::Cloud);
        fx.coordinator.request_exit(0);

        let loaded = fx.extensions.init(
            &settings(json!({"extensions": [{"id": "late", "command": "late-cmd"}]})),
            4000,
        );

        assert_eq!(loaded, 0);
        assert!(fx.spawner.children().is_empty());
        assert!(!fx.extensions.is_initialized());
        assert!(!fx.extensions.is_loaded("late"));
    }
}

// ============================================================================
// Idempotence
// ============================================================================

mod idempotence_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concurrent_requests_exit_once() {
        let fx = Fixture::with_terminator(RunMode::Cloud, |log| {
            RecordingTerminator::slow(log, Duration::from_millis(50))
        });

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let coordinator = Arc::clone(&fx.coordinator);
                thread::spawn(move || coordinator.request_exit(i))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fx.terminator.codes().len(), 1);
        let stops = fx
            .log
            .entries()
            .iter()
            .filter(|e| *e == "server-stop")
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_second_request_after_completion_is_noop() {
        let fx = Fixture::new(RunMode::Cloud);
        fx.coordinator.request_exit(0);
        fx.coordinator.request_exit(1);
        assert_eq!(fx.terminator.codes(), vec![0]);
    }

    #[test]
    fn test_window_mode_delegates_exit_to_window() {
        let fx = Fixture::new(RunMode::Window);
        fx.coordinator.request_exit(0);
        // The placeholder window cannot close, so the terminator is used.
        assert_eq!(fx.terminator.codes(), vec![0]);
    }
}

// ============================================================================
// Wait primitive
// ============================================================================

mod wait_tests {
    use super::*;

    #[test]
    fn test_wait_returns_within_one_interval() {
        let state = Arc::new(ShutdownState::new());
        let waiter = {
            let state = Arc::clone(&state);
            thread::spawn(move || state.wait())
        };

        thread::sleep(Duration::from_millis(50));
        let requested_at = Instant::now();
        state.request();
        waiter.join().unwrap();

        assert!(requested_at.elapsed() <= WAIT_POLL_INTERVAL);
    }

    #[test]
    fn test_exit_request_wakes_waiter() {
        let fx = Fixture::new(RunMode::Cloud);
        let state = Arc::clone(fx.coordinator.state());
        let waiter = thread::spawn(move || state.wait());

        fx.coordinator.request_exit(0);
        waiter.join().unwrap();

        assert!(fx.coordinator.state().is_requested());
    }
}
