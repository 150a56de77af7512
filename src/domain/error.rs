use std::fmt;

/// Errors surfaced by the service. The HTTP layer maps each variant to a status.
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    /// Unknown export document or route target.
    NotFound(String),
    /// Bad request input: query parameters, uploaded tables, config values.
    ValidationError(String),
    /// Data the service wrote itself could not be read back (cache payloads).
    ParseError(String),
    LLMError(String),
    /// Missing or wrong credentials.
    SecurityError(String),
    DatabaseError(String),
    IoError(String),
    /// Bitrix24 refused the call or answered with something unusable.
    CrmError(String),
}

impl AppError {
    /// Errors caused by the caller rather than the service or its upstreams.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::ValidationError(_) | AppError::SecurityError(_) | AppError::NotFound(_)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::LLMError(msg) => write!(f, "LLM error: {}", msg),
            AppError::SecurityError(msg) => write!(f, "Security error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
            AppError::CrmError(msg) => write!(f, "CRM error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
