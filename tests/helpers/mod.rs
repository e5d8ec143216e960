//! Shared test doubles for the integration tests.
//!
//! Every double appends to an [`EventLog`] so tests can assert on the
//! order in which the host touched its collaborators.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use apphost::api::{ControlHandler, ProcessIo};
use apphost::auth::{AuthError, AuthProvider, BasicAuth};
use apphost::config::Settings;
use apphost::extension::ExtensionManager;
use apphost::host::{EventDispatcher, HostError, TransportServer, Tray};
use apphost::process::{
    ChildHandle, OutputSinks, ProcessError, ProcessId, ProcessTable, Spawner,
};
use apphost::shutdown::{ShutdownCoordinator, ShutdownState, Terminator};
use apphost::RunMode;

/// Ordered record of collaborator calls.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What a fake child observed.
#[derive(Debug, Default)]
pub struct ChildState {
    pub command: String,
    pub input: Vec<u8>,
    pub input_closed: bool,
    pub terminated: bool,
}

/// Shared view of one fake child.
pub type ChildRecord = Arc<Mutex<ChildState>>;

struct MockChild {
    id: ProcessId,
    state: ChildRecord,
    log: EventLog,
}

impl ChildHandle for MockChild {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn write_input(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        let mut state = self.state.lock().unwrap();
        if state.input_closed {
            return Err(ProcessError::InputClosed(self.id));
        }
        state.input.extend_from_slice(bytes);
        Ok(())
    }

    fn close_input(&mut self) -> Result<(), ProcessError> {
        self.state.lock().unwrap().input_closed = true;
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        let mut state = self.state.lock().unwrap();
        self.log.push(format!("terminate:{}", state.command));
        if state.command.contains("stubborn") {
            return Err(ProcessError::Terminate {
                id: self.id,
                source: io::Error::other("refused"),
            });
        }
        state.terminated = true;
        Ok(())
    }
}

/// Spawner that never starts a real process.
///
/// Commands containing `fail` are rejected; children whose command
/// contains `stubborn` refuse to terminate.
#[derive(Clone, Default)]
pub struct MockSpawner {
    next_id: Arc<AtomicU64>,
    children: Arc<Mutex<Vec<ChildRecord>>>,
    log: EventLog,
}

impl MockSpawner {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn children(&self) -> Vec<ChildRecord> {
        self.children.lock().unwrap().clone()
    }

    pub fn spawned_commands(&self) -> Vec<String> {
        self.children()
            .iter()
            .map(|c| c.lock().unwrap().command.clone())
            .collect()
    }
}

impl Spawner for MockSpawner {
    fn spawn(
        &self,
        command: &str,
        _sinks: OutputSinks,
    ) -> Result<Box<dyn ChildHandle>, ProcessError> {
        if command.contains("fail") {
            return Err(ProcessError::Spawn {
                command: command.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
            });
        }

        let state = Arc::new(Mutex::new(ChildState {
            command: command.to_string(),
            ..ChildState::default()
        }));
        self.children.lock().unwrap().push(Arc::clone(&state));
        self.log.push(format!("spawn:{}", command));

        Ok(Box::new(MockChild {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            state,
            log: self.log.clone(),
        }))
    }
}

/// Terminator that records exit codes instead of exiting.
#[derive(Default)]
pub struct RecordingTerminator {
    codes: Mutex<Vec<i32>>,
    force_kills: AtomicU64,
    log: EventLog,
    delay: Duration,
}

impl RecordingTerminator {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Sleeps before recording, widening race windows.
    pub fn slow(log: EventLog, delay: Duration) -> Self {
        Self {
            log,
            delay,
            ..Self::default()
        }
    }

    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }

    pub fn force_kills(&self) -> u64 {
        self.force_kills.load(Ordering::SeqCst)
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        std::thread::sleep(self.delay);
        self.log.push(format!("exit:{}", code));
        self.codes.lock().unwrap().push(code);
    }

    fn force_kill(&self) {
        self.log.push("force-kill");
        self.force_kills.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport server and event dispatcher double.
#[derive(Default)]
pub struct RecordingServer {
    running: AtomicBool,
    events: Mutex<Vec<(String, Value)>>,
    log: EventLog,
}

impl RecordingServer {
    pub fn running(log: EventLog) -> Self {
        Self {
            running: AtomicBool::new(true),
            log,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }
}

impl TransportServer for RecordingServer {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) -> Result<(), HostError> {
        self.log.push("server-stop");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn port(&self) -> u16 {
        4000
    }
}

impl EventDispatcher for RecordingServer {
    fn dispatch_to_all(&self, event: &str, data: &Value) -> Result<usize, HostError> {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), data.clone()));
        Ok(1)
    }
}

/// Tray that is active until removed.
pub struct RecordingTray {
    active: AtomicBool,
    log: EventLog,
}

impl RecordingTray {
    pub fn active(log: EventLog) -> Self {
        Self {
            active: AtomicBool::new(true),
            log,
        }
    }
}

impl Tray for RecordingTray {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn remove(&self) -> Result<(), HostError> {
        self.log.push("tray-remove");
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Auth provider whose tokens are unavailable.
pub struct FailingAuth;

impl AuthProvider for FailingAuth {
    fn token(&self) -> Result<String, AuthError> {
        Err(AuthError::Unavailable("Access"))
    }

    fn connect_token(&self) -> Result<String, AuthError> {
        Err(AuthError::Unavailable("Connect"))
    }
}

/// In-memory writer shared with the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Builds settings rooted at `/opt/app`.
pub fn settings(document: Value) -> Settings {
    Settings::from_document(document, PathBuf::from("/opt/app")).expect("valid settings")
}

/// Tokens used by [`test_auth`].
pub const TEST_TOKEN: &str = "test-token";
pub const TEST_CONNECT_TOKEN: &str = "test-connect-token";

pub fn test_auth() -> Arc<BasicAuth> {
    Arc::new(BasicAuth::with_tokens(TEST_TOKEN, TEST_CONNECT_TOKEN))
}

/// Everything needed to drive a coordinator in-process.
pub struct Fixture {
    pub log: EventLog,
    pub spawner: MockSpawner,
    pub processes: Arc<ProcessTable>,
    pub extensions: Arc<ExtensionManager>,
    pub server: Arc<RecordingServer>,
    pub terminator: Arc<RecordingTerminator>,
    pub coordinator: Arc<ShutdownCoordinator>,
}

impl Fixture {
    pub fn new(mode: RunMode) -> Self {
        Self::with_terminator(mode, RecordingTerminator::with_log)
    }

    pub fn with_terminator(
        mode: RunMode,
        terminator: impl FnOnce(EventLog) -> RecordingTerminator,
    ) -> Self {
        let log = EventLog::default();
        let spawner = MockSpawner::with_log(log.clone());
        let state = Arc::new(ShutdownState::new());
        let processes = Arc::new(ProcessTable::new());
        let extensions = Arc::new(
            ExtensionManager::new(Arc::new(spawner.clone()), test_auth())
                .with_sinks(OutputSinks::discard())
                .with_shutdown_state(Arc::clone(&state)),
        );
        let server = Arc::new(RecordingServer::running(log.clone()));
        let terminator = Arc::new(terminator(log.clone()));
        let coordinator = Arc::new(
            ShutdownCoordinator::new(
                state,
                Arc::clone(&extensions),
                Arc::clone(&processes),
                mode,
            )
            .with_server(server.clone())
            .with_tray(Arc::new(RecordingTray::active(log.clone())))
            .with_terminator(terminator.clone())
            .with_grace_period(Duration::ZERO),
        );

        Self {
            log,
            spawner,
            processes,
            extensions,
            server,
            terminator,
            coordinator,
        }
    }

    /// Handler over this fixture with in-memory standard streams.
    pub fn handler(&self, stdin: &str, stdout: &SharedBuffer, stderr: &SharedBuffer) -> ControlHandler {
        ControlHandler::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.extensions),
            self.server.clone(),
            test_auth(),
            serde_json::json!({"applicationId": "js.apphost.test"}),
        )
        .with_io(ProcessIo::new(
            Box::new(io::Cursor::new(stdin.as_bytes().to_vec())),
            Box::new(stdout.clone()),
            Box::new(stderr.clone()),
        ))
    }
}
