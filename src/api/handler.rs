//! API request handler.
//!
//! Dispatches control requests to the shutdown coordinator, the extension
//! manager, the event dispatcher and the host's standard streams.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::debug;

use crate::api::ApiError;
use crate::api::protocol::{ApiRequest, ApiResponse, ControlOutput};
use crate::auth::AuthProvider;
use crate::extension::ExtensionManager;
use crate::host::EventDispatcher;
use crate::shutdown::ShutdownCoordinator;

/// The host's standard streams as seen by the control endpoints.
pub struct ProcessIo {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
    error: Mutex<Box<dyn Write + Send>>,
}

impl ProcessIo {
    /// Uses the process's real stdin, stdout and stderr.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            Box::new(BufReader::new(io::stdin())),
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
    }

    /// Uses the given streams.
    #[must_use]
    pub fn new(
        input: Box<dyn BufRead + Send>,
        output: Box<dyn Write + Send>,
        error: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            error: Mutex::new(error),
        }
    }

    /// Reads one line, or with `read_all` every line up to the first empty
    /// line or end of input, each followed by a newline.
    fn read_lines(&self, read_all: bool) -> io::Result<String> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let content = line.trim_end_matches('\n').trim_end_matches('\r');
            if content.is_empty() {
                break;
            }
            lines.push_str(content);
            if !read_all {
                break;
            }
            lines.push('\n');
        }
        Ok(lines)
    }

    fn write_to(stream: &Mutex<Box<dyn Write + Send>>, data: &str) -> io::Result<()> {
        let mut stream = stream.lock().unwrap_or_else(PoisonError::into_inner);
        stream.write_all(data.as_bytes())?;
        stream.flush()
    }
}

impl std::fmt::Debug for ProcessIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessIo").finish_non_exhaustive()
    }
}

/// Returns a mandatory string field.
fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ApiError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or(ApiError::MissingArguments)
}

/// Control request handler.
pub struct ControlHandler {
    coordinator: Arc<ShutdownCoordinator>,
    extensions: Arc<ExtensionManager>,
    events: Arc<dyn EventDispatcher>,
    auth: Arc<dyn AuthProvider>,
    config: Value,
    io: ProcessIo,
}

impl ControlHandler {
    /// Creates a handler on the process's standard streams.
    ///
    /// `config` is the configuration document returned by `app.getConfig`.
    #[must_use]
    pub fn new(
        coordinator: Arc<ShutdownCoordinator>,
        extensions: Arc<ExtensionManager>,
        events: Arc<dyn EventDispatcher>,
        auth: Arc<dyn AuthProvider>,
        config: Value,
    ) -> Self {
        Self {
            coordinator,
            extensions,
            events,
            auth,
            config,
            io: ProcessIo::standard(),
        }
    }

    /// Replaces the standard streams.
    #[must_use]
    pub fn with_io(mut self, io: ProcessIo) -> Self {
        self.io = io;
        self
    }

    /// Verifies the access token, runs the method and wraps the output.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        debug!("Handling API request: {}", request.method);

        let output = if self.auth.verify(&request.access_token) {
            self.dispatch(&request.method, &request.data)
        } else {
            ControlOutput::error(&ApiError::InvalidToken)
        };
        ApiResponse::new(request, output)
    }

    /// Runs `method` with `input`, turning failures into error outputs.
    pub fn dispatch(&self, method: &str, input: &Value) -> ControlOutput {
        let result = match method {
            "app.exit" => self.exit(input),
            "app.killProcess" => self.kill_process(input),
            "app.getConfig" => self.get_config(input),
            "app.broadcast" => self.broadcast(input),
            "app.readProcessInput" => self.read_process_input(input),
            "app.writeProcessOutput" => self.write_process_output(input),
            "app.writeProcessError" => self.write_process_error(input),
            "app.getProcessId" => Ok(ControlOutput::returning(std::process::id())),
            "extensions.getLoaded" => Ok(ControlOutput::returning(self.extensions.get_loaded())),
            "extensions.isLoaded" => self.is_loaded(input),
            _ => Err(ApiError::MethodNotFound(method.to_string())),
        };

        result.unwrap_or_else(|e| {
            debug!("{} failed: {}", method, e);
            ControlOutput::error(&e)
        })
    }

    /// Shuts the host down with the optional `code` (default 0).
    pub fn exit(&self, input: &Value) -> Result<ControlOutput, ApiError> {
        let code = input
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(0);
        self.coordinator.request_exit(code);
        Ok(ControlOutput::success())
    }

    /// Kills the host immediately, skipping the teardown.
    pub fn kill_process(&self, _input: &Value) -> Result<ControlOutput, ApiError> {
        self.coordinator.terminator().force_kill();
        Ok(ControlOutput::success())
    }

    /// Returns the configuration document.
    pub fn get_config(&self, _input: &Value) -> Result<ControlOutput, ApiError> {
        Ok(ControlOutput::returning(self.config.clone()))
    }

    /// Dispatches the mandatory `event` with optional `data` to every
    /// session.
    pub fn broadcast(&self, input: &Value) -> Result<ControlOutput, ApiError> {
        let event = required_str(input, "event")?;
        let data = input.get("data").cloned().unwrap_or(Value::Null);
        let reached = self.events.dispatch_to_all(event, &data)?;
        debug!("Event {} dispatched to {} session(s)", event, reached);
        Ok(ControlOutput::success())
    }

    /// Reads one line from stdin, or every line with `readAll`.
    pub fn read_process_input(&self, input: &Value) -> Result<ControlOutput, ApiError> {
        let read_all = input
            .get("readAll")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let lines = self.io.read_lines(read_all)?;
        Ok(ControlOutput::returning(lines))
    }

    /// Writes the mandatory `data` verbatim to stdout.
    pub fn write_process_output(&self, input: &Value) -> Result<ControlOutput, ApiError> {
        let data = required_str(input, "data")?;
        ProcessIo::write_to(&self.io.output, data)?;
        Ok(ControlOutput::with_message("Wrote data to stdout"))
    }

    /// Writes the mandatory `data` verbatim to stderr.
    pub fn write_process_error(&self, input: &Value) -> Result<ControlOutput, ApiError> {
        let data = required_str(input, "data")?;
        ProcessIo::write_to(&self.io.error, data)?;
        Ok(ControlOutput::with_message("Wrote data to stderr"))
    }

    /// Reports whether the extension `id` is loaded.
    pub fn is_loaded(&self, input: &Value) -> Result<ControlOutput, ApiError> {
        let id = required_str(input, "id")?;
        Ok(ControlOutput::returning(self.extensions.is_loaded(id)))
    }
}

impl std::fmt::Debug for ControlHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandler").finish_non_exhaustive()
    }
}
