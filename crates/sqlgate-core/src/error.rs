//! Error taxonomy surfaced by every public gateway entrypoint.
//!
//! Backend and helper failures are always converted into one of these four
//! classes before they leave the gateway; raw driver errors never do.

use thiserror::Error;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors returned to callers of the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed or incomplete input (user-correctable, never retried).
    #[error("invalid argument: {0}")]
    Validation(String),

    /// Unknown profile, collection or identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend connectivity or SQL execution failure, carrying the backend message.
    #[error("SQL Error: {0}")]
    Unavailable(String),

    /// Unexpected defect. The message is generic; details are logged server-side.
    #[error("Internal Error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable wire code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// The message without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::NotFound(m) | Self::Unavailable(m) | Self::Internal(m) => m,
        }
    }

    /// Rebuild an error from its wire code and message.
    ///
    /// Unknown codes are treated as internal errors.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "INVALID_ARGUMENT" => Self::Validation(message),
            "NOT_FOUND" => Self::NotFound(message),
            "UNAVAILABLE" => Self::Unavailable(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(e.to_string())
    }
}
