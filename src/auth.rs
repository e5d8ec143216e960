//! Access tokens for the control server and extensions.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;
use tracing::info;

/// Auth info file, relative to the app path.
pub const AUTH_INFO_FILE: &str = ".tmp/auth_info.json";

/// Auth errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A token could not be supplied.
    #[error("{0} token is not available")]
    Unavailable(&'static str),

    /// Writing the auth info file failed.
    #[error("Failed to export auth info: {0}")]
    Export(#[from] std::io::Error),

    /// Serializing the auth info failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Supplies the internal tokens handed to extensions.
pub trait AuthProvider: Send + Sync {
    /// Returns the access token.
    fn token(&self) -> Result<String, AuthError>;

    /// Returns the connect token.
    fn connect_token(&self) -> Result<String, AuthError>;

    /// Checks a candidate access token in constant time.
    fn verify(&self, candidate: &str) -> bool {
        self.token()
            .is_ok_and(|token| constant_time_eq(token.as_bytes(), candidate.as_bytes()))
    }
}

/// Compares two byte strings without an early exit on the first mismatch.
///
/// Only the length is revealed through timing.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Random per-process tokens.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    token: String,
    connect_token: String,
}

impl BasicAuth {
    /// Generates fresh random tokens.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            token: generate_token(),
            connect_token: generate_token(),
        }
    }

    /// Uses fixed tokens.
    #[must_use]
    pub fn with_tokens(token: impl Into<String>, connect_token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            connect_token: connect_token.into(),
        }
    }
}

impl AuthProvider for BasicAuth {
    fn token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }

    fn connect_token(&self) -> Result<String, AuthError> {
        Ok(self.connect_token.clone())
    }
}

/// Generates a random token.
#[must_use]
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Writes `{nlPort, nlToken, nlConnectToken}` to the auth info file.
///
/// # Errors
/// Returns error if a token is unavailable or the file cannot be written.
pub fn export_auth_info(
    app_path: &Path,
    port: u16,
    auth: &dyn AuthProvider,
) -> Result<PathBuf, AuthError> {
    let info = json!({
        "nlPort": port.to_string(),
        "nlToken": auth.token()?,
        "nlConnectToken": auth.connect_token()?,
    });

    let path = app_path.join(AUTH_INFO_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string(&info)?)?;

    info!("Auth info exported to {}", path.display());
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_differ() {
        let auth = BasicAuth::generate();
        assert_ne!(auth.token().unwrap(), auth.connect_token().unwrap());
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_verify() {
        let auth = BasicAuth::with_tokens("abc", "def");
        assert!(auth.verify("abc"));
        assert!(!auth.verify("def"));
        assert!(!auth.verify(""));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token-longer"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_export_auth_info() {
        let dir = tempfile::tempdir().unwrap();
        let auth = BasicAuth::with_tokens("tok", "conn");

        let path = export_auth_info(dir.path(), 4567, &auth).unwrap();

        let info: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(info["nlPort"], "4567");
        assert_eq!(info["nlToken"], "tok");
        assert_eq!(info["nlConnectToken"], "conn");
    }
}
