//! API server implementation.
//!
//! Listens on a loopback TCP port. The accept loop runs in a background
//! thread and every session gets its own thread reading requests and
//! writing responses. Events are pushed to every open session.

use std::collections::HashMap;
use std::io::{self, BufReader, ErrorKind, Write};
use std::net::{Ipv4Addr, Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::handler::ControlHandler;
use crate::api::protocol::{ApiRequest, ApiResponse, EventMessage};
use crate::api::transport::{BufferedConnection, Connection};
use crate::api::ApiError;
use crate::host::{EventDispatcher, HostError, TransportServer};

/// Sleep between accept polls.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Longest a single write to a session may block.
const SESSION_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Write half of a session, shared between its reader thread and event
/// dispatch.
#[derive(Clone)]
struct SessionWriter {
    stream: Arc<Mutex<TcpStream>>,
    /// Separate handle for shutdown; never locked, so closing cannot wait
    /// on a writer blocked by a client that stopped reading.
    closer: Arc<TcpStream>,
}

impl SessionWriter {
    fn new(stream: TcpStream) -> io::Result<Self> {
        let closer = stream.try_clone()?;
        Ok(Self {
            stream: Arc::new(Mutex::new(stream)),
            closer: Arc::new(closer),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TcpStream> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let _ = self.closer.shutdown(Shutdown::Both);
    }
}

impl Write for SessionWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

/// Loopback control server.
pub struct ControlServer {
    listener: Mutex<Option<TcpListener>>,
    port: u16,
    running: AtomicBool,
    shutdown: AtomicBool,
    sessions: Mutex<HashMap<u64, SessionWriter>>,
    next_session: AtomicU64,
}

impl ControlServer {
    /// Binds `127.0.0.1:port`. Port 0 picks a free port.
    ///
    /// # Errors
    /// Returns error if the port cannot be bound.
    pub fn bind(port: u16) -> Result<Self, ApiError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            port,
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        })
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<u64, SessionWriter>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Starts the accept loop in a background thread.
    ///
    /// # Errors
    /// Returns error if the server was already started or the thread
    /// cannot be spawned.
    pub fn start(self: &Arc<Self>, handler: Arc<ControlHandler>) -> Result<JoinHandle<()>, ApiError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                ApiError::Transport(io::Error::new(
                    ErrorKind::AlreadyExists,
                    "server already started",
                ))
            })?;

        self.running.store(true, Ordering::SeqCst);
        let server = Arc::clone(self);
        let thread = thread::Builder::new()
            .name("control-server".into())
            .spawn(move || server.run(&listener, &handler))?;

        info!("Control server listening on 127.0.0.1:{}", self.port);
        Ok(thread)
    }

    fn run(self: &Arc<Self>, listener: &TcpListener, handler: &Arc<ControlHandler>) {
        while !self.shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("Control client connected from {}", addr);
                    if let Err(e) = self.open_session(stream, Arc::clone(handler)) {
                        warn!("Failed to open session: {}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::SeqCst) {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Control server shutting down");
    }

    fn open_session(
        self: &Arc<Self>,
        stream: TcpStream,
        handler: Arc<ControlHandler>,
    ) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(SESSION_WRITE_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = SessionWriter::new(stream)?;

        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        self.sessions().insert(id, writer.clone());
        if self.shutdown.load(Ordering::SeqCst) {
            self.sessions().remove(&id);
            writer.close();
            return Ok(());
        }

        let server = Arc::clone(self);
        thread::Builder::new()
            .name(format!("control-session-{}", id))
            .spawn(move || {
                let mut conn = BufferedConnection::new(reader, writer);
                Self::handle_connection(&mut conn, &handler);
                server.sessions().remove(&id);
                debug!("Control session {} closed", id);
            })?;
        Ok(())
    }

    /// Handles a single client connection until it closes.
    fn handle_connection<C: Connection>(conn: &mut C, handler: &ControlHandler) {
        while conn.is_open() {
            let msg = match conn.read_message() {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Error reading message: {}", e);
                    break;
                }
            };

            let response = match serde_json::from_str::<ApiRequest>(&msg) {
                Ok(request) => handler.handle(&request),
                Err(e) => ApiResponse::invalid(&ApiError::Json(e)),
            };

            if let Err(e) = Self::send_response(conn, &response) {
                debug!("Failed to send response: {}", e);
                break;
            }
        }
    }

    fn send_response<C: Connection>(conn: &mut C, response: &ApiResponse) -> Result<(), ApiError> {
        let json = serde_json::to_string(response)?;
        conn.write_message(&json)
    }
}

impl TransportServer for ControlServer {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops accepting and closes every session without joining any
    /// thread, so it may be called from a session thread.
    fn stop(&self) -> Result<(), HostError> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        for (_, session) in self.sessions().drain() {
            session.close();
        }
        Ok(())
    }

    fn port(&self) -> u16 {
        self.port
    }
}

impl EventDispatcher for ControlServer {
    fn dispatch_to_all(&self, event: &str, data: &Value) -> Result<usize, HostError> {
        let message = EventMessage {
            event: event.to_string(),
            data: data.clone(),
        };
        let line = format!(
            "{}\n",
            serde_json::to_string(&message).map_err(io::Error::other)?
        );

        let sessions: Vec<SessionWriter> = self.sessions().values().cloned().collect();
        let mut reached = 0;
        for mut session in sessions {
            match session.write_all(line.as_bytes()) {
                Ok(()) => reached += 1,
                Err(e) => debug!("Event delivery failed: {}", e),
            }
        }
        Ok(reached)
    }
}

impl std::fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlServer")
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
