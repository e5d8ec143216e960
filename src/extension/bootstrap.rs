//! Bootstrap payload handed to a freshly spawned extension.

use serde::{Serialize, Serializer};

use crate::auth::{AuthError, AuthProvider};

/// Credentials and address an extension needs to connect back.
///
/// Written once to the extension's stdin, followed by end-of-input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapPayload {
    /// Control server port, string-encoded on the wire.
    #[serde(rename = "nlPort", serialize_with = "serialize_port")]
    pub server_port: u16,
    /// Internal access token.
    #[serde(rename = "nlToken")]
    pub auth_token: String,
    /// Internal connect token.
    #[serde(rename = "nlConnectToken")]
    pub connect_token: String,
    /// Id of the extension receiving the payload.
    #[serde(rename = "nlExtensionId")]
    pub extension_id: String,
}

fn serialize_port<S: Serializer>(port: &u16, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(port)
}

impl BootstrapPayload {
    /// Builds the payload for `extension_id`.
    ///
    /// # Errors
    /// Returns error if the auth provider cannot supply a token.
    pub fn build(
        extension_id: &str,
        server_port: u16,
        auth: &dyn AuthProvider,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            server_port,
            auth_token: auth.token()?,
            connect_token: auth.connect_token()?,
            extension_id: extension_id.to_string(),
        })
    }

    /// Serializes the payload for the extension's input channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
