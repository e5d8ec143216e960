//! Control API.
//!
//! Frontend sessions and extensions drive the host through newline-delimited
//! JSON requests on a loopback TCP socket. Each request names a method such
//! as `app.exit` and carries the access token handed out at startup.

pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;

use thiserror::Error;

use crate::host::HostError;

pub use handler::{ControlHandler, ProcessIo};
pub use protocol::{ApiRequest, ApiResponse, ControlOutput, ErrorPayload, EventMessage};
pub use server::ControlServer;

/// Error code for missing or wrongly typed arguments.
pub const MISSING_ARGUMENTS_CODE: &str = "NE_RT_NATRTER";

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport/IO error.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The request line is not a valid request.
    #[error("Invalid request: {0}")]
    Json(#[from] serde_json::Error),

    /// A mandatory argument is absent or has the wrong type.
    #[error("Missing mandatory arguments")]
    MissingArguments,

    /// Method not found.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The access token does not match.
    #[error("Invalid or expired access token")]
    InvalidToken,

    /// A host collaborator failed.
    #[error("Native method execution error: {0}")]
    Host(#[from] HostError),
}

impl ApiError {
    /// Returns the error code reported to callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingArguments => MISSING_ARGUMENTS_CODE,
            ApiError::MethodNotFound(_) => "NE_RT_INVMETH",
            ApiError::InvalidToken => "NE_RT_INVTOKN",
            ApiError::Json(_) => "NE_RT_INVREQ",
            ApiError::Transport(_) | ApiError::Host(_) => "NE_RT_NATPRME",
        }
    }

    /// Builds the `{code, message}` error payload.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
