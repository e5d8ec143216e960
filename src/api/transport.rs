//! Newline-delimited message transport.

use std::io::{BufRead, ErrorKind, Write};

use crate::api::ApiError;

/// Connection trait for reading/writing messages.
pub trait Connection: Send {
    /// Reads a single JSON message (newline-delimited).
    fn read_message(&mut self) -> Result<Option<String>, ApiError>;

    /// Writes a single JSON message (with newline).
    fn write_message(&mut self, msg: &str) -> Result<(), ApiError>;

    /// Checks if connection is still open.
    fn is_open(&self) -> bool;
}

/// Generic buffered connection wrapper.
pub struct BufferedConnection<R: BufRead, W: Write> {
    reader: R,
    writer: W,
    open: bool,
}

impl<R: BufRead + Send, W: Write + Send> BufferedConnection<R, W> {
    /// Creates a new buffered connection.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            open: true,
        }
    }
}

impl<R: BufRead + Send, W: Write + Send> Connection for BufferedConnection<R, W> {
    fn read_message(&mut self) -> Result<Option<String>, ApiError> {
        if !self.open {
            return Ok(None);
        }

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                self.open = false;
                Ok(None)
            }
            Ok(_) => {
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(None)
            }
            Err(e) => {
                self.open = false;
                Err(ApiError::Transport(e))
            }
        }
    }

    fn write_message(&mut self, msg: &str) -> Result<(), ApiError> {
        if !self.open {
            return Err(ApiError::Transport(std::io::Error::new(
                ErrorKind::NotConnected,
                "Connection closed",
            )));
        }

        // One write per message so concurrent event pushes never split a line.
        let line = format!("{}\n", msg);
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
