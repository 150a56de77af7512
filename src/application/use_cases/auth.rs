//! Single-user access gate checked on every API request via HTTP Basic
//! credentials. It keeps casual visitors out; it is not an account system.

use crate::domain::error::{AppError, Result};
use base64::Engine;
use sha2::{Digest, Sha256};

pub const DEFAULT_USERNAME: &str = "admin";
/// sha256("admin123")
pub const DEFAULT_PASSWORD_SHA256: &str =
    "240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9";

pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    disabled: bool,
    username: String,
    password_sha256: String,
}

impl AccessGate {
    pub fn new(disabled: bool, username: &str, password_sha256: &str) -> Self {
        Self {
            disabled,
            username: username.to_string(),
            password_sha256: password_sha256.trim().to_ascii_lowercase(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        username == self.username && sha256_hex(password) == self.password_sha256
    }

    /// Validates an `Authorization` header value.
    pub fn check_header(&self, header: Option<&str>) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        let header = header
            .ok_or_else(|| AppError::SecurityError("Missing credentials".to_string()))?;
        let (username, password) = parse_basic(header)?;
        if self.verify(&username, &password) {
            Ok(())
        } else {
            Err(AppError::SecurityError("Invalid username or password".to_string()))
        }
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(false, DEFAULT_USERNAME, DEFAULT_PASSWORD_SHA256)
    }
}

fn parse_basic(header: &str) -> Result<(String, String)> {
    let encoded = header
        .trim()
        .strip_prefix("Basic ")
        .ok_or_else(|| AppError::SecurityError("Unsupported authorization scheme".to_string()))?;
    let decoded = base64::prelude::BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::SecurityError(format!("Malformed credentials: {}", e)))?;
    let text = String::from_utf8(decoded)
        .map_err(|_| AppError::SecurityError("Credentials are not UTF-8".to_string()))?;
    let (username, password) = text
        .split_once(':')
        .ok_or_else(|| AppError::SecurityError("Malformed credentials".to_string()))?;
    Ok((username.to_string(), password.to_string()))
}
