//! Query submissions, the frames a query streams back, and import jobs.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::types::{SchemaField, TypeField};

/// Row cap applied when the caller does not give one.
pub const DEFAULT_MAX_ROW: usize = 1000;

/// One query invocation: SQL, cancellation key and row cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub sql: String,
    pub identifier: String,
    pub max_row: usize,
}

impl QueryContext {
    pub fn new(sql: impl Into<String>, identifier: impl Into<String>, max_row: Option<usize>) -> Self {
        Self {
            sql: sql.into(),
            identifier: identifier.into(),
            max_row: max_row.unwrap_or(DEFAULT_MAX_ROW),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sql.trim().is_empty() {
            return Err(GatewayError::validation("sql must not be empty"));
        }
        Ok(())
    }
}

/// One unit of a query's result stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultFrame {
    /// Column metadata; sent at most once per stream.
    Fields(Vec<SchemaField>),
    /// One row, already encoded as a JSON value.
    Row(Bytes),
    /// Sent at most once, after the last row.
    Truncated(bool),
}

/// Terminal state of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Completed { rows: u64 },
    Truncated { rows: u64 },
    Cancelled,
    Failed(GatewayError),
}

impl QueryOutcome {
    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            QueryOutcome::Completed { .. } => "completed",
            QueryOutcome::Truncated { .. } => "truncated",
            QueryOutcome::Cancelled => "cancelled",
            QueryOutcome::Failed(_) => "failed",
        }
    }
}

/// Tabular data to materialize as a new table.
///
/// `None` cells are written as SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportJob {
    pub database: String,
    pub collection: String,
    pub schema: Option<String>,
    pub fields: Vec<TypeField>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ImportJob {
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(GatewayError::validation("collection must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(GatewayError::validation("import needs at least one field"));
        }
        if let Some(i) = self.rows.iter().position(|r| r.len() != self.fields.len()) {
            return Err(GatewayError::validation(format!(
                "row {} has {} values, expected {}",
                i + 1,
                self.rows[i].len(),
                self.fields.len()
            )));
        }
        Ok(())
    }
}
