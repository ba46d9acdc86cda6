//! Typed errors for the connectors crate.

use std::fmt;

use sqlgate_core::GatewayError;

/// Errors raised by backend drivers and the import pipeline.
#[derive(Debug)]
pub enum ConnectorError {
    /// Could not reach the backend or obtain a connection.
    ConnectionFailed(String),
    /// The requested table or view does not exist.
    CollectionNotFound(String),
    /// No driver or no column mapping for the requested type.
    UnsupportedType(String),
    /// The backend rejected or failed a statement.
    QueryFailed(String),
    /// Invalid or missing configuration.
    ConfigError(String),
    /// Malformed import input (bad CSV, wrong content type, bad cell value).
    InvalidData(String),
    /// Loading or writing import data failed.
    ImportFailed(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            ConnectorError::CollectionNotFound(msg) => write!(f, "collection not found: {}", msg),
            ConnectorError::UnsupportedType(msg) => write!(f, "unsupported type: {}", msg),
            ConnectorError::QueryFailed(msg) => write!(f, "{}", msg),
            ConnectorError::ConfigError(msg) => write!(f, "config error: {}", msg),
            ConnectorError::InvalidData(msg) => write!(f, "invalid data: {}", msg),
            ConnectorError::ImportFailed(msg) => write!(f, "import failed: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<sqlx::Error> for ConnectorError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Configuration(_) => ConnectorError::ConfigError(e.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ConnectorError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db) => ConnectorError::QueryFailed(db.message().to_string()),
            other => ConnectorError::QueryFailed(other.to_string()),
        }
    }
}

impl From<csv::Error> for ConnectorError {
    fn from(e: csv::Error) -> Self {
        ConnectorError::InvalidData(e.to_string())
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(e: reqwest::Error) -> Self {
        ConnectorError::ImportFailed(e.to_string())
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(e: std::io::Error) -> Self {
        ConnectorError::ImportFailed(e.to_string())
    }
}

impl From<ConnectorError> for GatewayError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::ConnectionFailed(_)
            | ConnectorError::QueryFailed(_)
            | ConnectorError::ImportFailed(_) => GatewayError::Unavailable(e.to_string()),
            ConnectorError::CollectionNotFound(msg) => GatewayError::NotFound(msg),
            ConnectorError::UnsupportedType(_)
            | ConnectorError::ConfigError(_)
            | ConnectorError::InvalidData(_) => GatewayError::Validation(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_mapping_by_class() {
        let cases = [
            (ConnectorError::ConnectionFailed("refused".into()), "UNAVAILABLE"),
            (ConnectorError::QueryFailed("syntax".into()), "UNAVAILABLE"),
            (ConnectorError::ImportFailed("io".into()), "UNAVAILABLE"),
            (ConnectorError::CollectionNotFound("t".into()), "NOT_FOUND"),
            (ConnectorError::UnsupportedType("Oracle".into()), "INVALID_ARGUMENT"),
            (ConnectorError::ConfigError("port".into()), "INVALID_ARGUMENT"),
            (ConnectorError::InvalidData("ragged".into()), "INVALID_ARGUMENT"),
        ];
        for (err, code) in cases {
            assert_eq!(GatewayError::from(err).code(), code);
        }
    }

    #[test]
    fn query_failure_keeps_backend_message_verbatim() {
        let err = GatewayError::from(ConnectorError::QueryFailed(
            "relation \"nope\" does not exist".into(),
        ));
        assert_eq!(err.message(), "relation \"nope\" does not exist");
    }

    #[test]
    fn pool_timeout_is_a_connection_failure() {
        let err = ConnectorError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ConnectorError::ConnectionFailed(_)));
    }
}
