//! Client-side error type.

use sqlgate_core::{GatewayError, WireError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with one of its error classes.
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid auth: {0}")]
    InvalidAuth(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<WireError> for ClientError {
    fn from(e: WireError) -> Self {
        ClientError::Remote {
            code: e.code,
            message: e.message,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidUrl(e.to_string())
    }
}

impl From<ClientError> for GatewayError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Remote { code, message } => GatewayError::from_code(&code, message),
            ClientError::Http(e) => GatewayError::unavailable(e.to_string()),
            ClientError::InvalidAuth(_) | ClientError::InvalidUrl(_) => {
                GatewayError::validation(e.to_string())
            }
            ClientError::Decode(_) => GatewayError::internal(e.to_string()),
        }
    }
}
