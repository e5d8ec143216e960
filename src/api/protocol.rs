//! API protocol definitions.
//!
//! One JSON object per line in each direction. Requests carry the method,
//! the access token and the endpoint input; responses echo the id and
//! method and carry the endpoint output. Events are pushed to every
//! session without a request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

/// API request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Request ID for correlation.
    #[serde(default)]
    pub id: String,
    /// Method name (e.g., "app.exit").
    pub method: String,
    /// Access token issued at startup.
    #[serde(rename = "accessToken", default)]
    pub access_token: String,
    /// Endpoint input.
    #[serde(default)]
    pub data: Value,
}

/// API response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Request ID for correlation.
    pub id: String,
    /// Method the response belongs to.
    pub method: String,
    /// Endpoint output.
    pub data: ControlOutput,
}

impl ApiResponse {
    /// Creates a response to `request`.
    #[must_use]
    pub fn new(request: &ApiRequest, data: ControlOutput) -> Self {
        Self {
            id: request.id.clone(),
            method: request.method.clone(),
            data,
        }
    }

    /// Creates a response for a line that could not be parsed as a request.
    #[must_use]
    pub fn invalid(error: &ApiError) -> Self {
        Self {
            id: String::new(),
            method: String::new(),
            data: ControlOutput::error(error),
        }
    }
}

/// Event pushed to every connected session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event name.
    pub event: String,
    /// Event data.
    pub data: Value,
}

/// Error structure of a failed endpoint call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// Output of a control endpoint.
///
/// Either `success` is true (with an optional `returnValue` or `message`)
/// or `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlOutput {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub success: bool,
    #[serde(
        rename = "returnValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub return_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ControlOutput {
    /// Creates a bare success output.
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Creates a success output carrying `value`.
    #[must_use]
    pub fn returning(value: impl Into<Value>) -> Self {
        Self {
            success: true,
            return_value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Creates a success output carrying a message.
    #[must_use]
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Creates an error output.
    #[must_use]
    pub fn error(error: &ApiError) -> Self {
        Self {
            error: Some(error.to_payload()),
            ..Self::default()
        }
    }

    /// Returns true for an error output.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
