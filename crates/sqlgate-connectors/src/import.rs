//! Transactional create-table-and-insert shared by every backend.
//!
//! Drivers supply an [`ImportSession`] (one open transaction) and a
//! [`Dialect`]; [`create_table_and_write`] runs the DDL and the inserts
//! through it and either commits everything or rolls everything back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlgate_core::{ImportJob, SqlType};
use tracing::{debug, info, warn};

use crate::csv_reader::parse_csv;
use crate::dialect::Dialect;
use crate::error::ConnectorError;
use crate::source::{load_source, CSV_CONTENT_TYPE};
use crate::BackendDriver;

/// Bind parameters one statement may carry on either backend.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// A typed insert parameter. `None` binds SQL `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
}

impl BindValue {
    /// Converts a textual cell to the parameter type for `sql_type`.
    pub fn parse(sql_type: SqlType, cell: Option<&str>) -> Result<Self, ConnectorError> {
        let bad = |v: &str| {
            ConnectorError::InvalidData(format!("'{}' is not a valid {} value", v, sql_type))
        };
        Ok(match sql_type {
            SqlType::Bit | SqlType::Boolean => BindValue::Bool(match cell {
                None => None,
                Some(v) if v.trim().eq_ignore_ascii_case("true") => Some(true),
                Some(v) if v.trim().eq_ignore_ascii_case("false") => Some(false),
                Some(v) => return Err(bad(v)),
            }),
            SqlType::Tinyint | SqlType::Smallint | SqlType::Integer | SqlType::Bigint => {
                BindValue::Int(match cell {
                    None => None,
                    Some(v) => Some(v.trim().parse().map_err(|_| bad(v))?),
                })
            }
            SqlType::Real | SqlType::Float | SqlType::Double => BindValue::Float(match cell {
                None => None,
                Some(v) => Some(v.trim().parse().map_err(|_| bad(v))?),
            }),
            _ => BindValue::Text(cell.map(str::to_string)),
        })
    }
}

/// One open import transaction on a backend connection.
#[async_trait]
pub trait ImportSession: Send {
    async fn execute(&mut self, sql: &str) -> Result<(), ConnectorError>;

    /// Runs the multi-row insert `sql` once, binding `rows` row by row.
    async fn insert_rows(
        &mut self,
        sql: &str,
        rows: &[Vec<BindValue>],
    ) -> Result<(), ConnectorError>;

    async fn commit(self) -> Result<(), ConnectorError>;

    async fn rollback(self) -> Result<(), ConnectorError>;
}

/// Creates `job`'s table and inserts all of its rows in one transaction.
///
/// Returns the number of rows written. On any failure the transaction is
/// rolled back and the original error is returned.
pub async fn create_table_and_write<S: ImportSession>(
    mut session: S,
    dialect: &dyn Dialect,
    job: &ImportJob,
) -> Result<u64, ConnectorError> {
    if let Err(e) = job.validate() {
        let _ = session.rollback().await;
        return Err(ConnectorError::InvalidData(e.message().to_string()));
    }
    let table = dialect.qualified_table(job.schema.as_deref(), &job.collection);
    match write_all(&mut session, dialect, job).await {
        Ok(rows) => {
            session.commit().await?;
            info!("imported {} rows into {} @ {}", rows, table, job.database);
            Ok(rows)
        }
        Err(e) => {
            warn!("import into {} failed, rolling back: {}", table, e);
            if let Err(rb) = session.rollback().await {
                warn!("rollback of {} failed: {}", table, rb);
            }
            Err(e)
        }
    }
}

async fn write_all<S: ImportSession>(
    session: &mut S,
    dialect: &dyn Dialect,
    job: &ImportJob,
) -> Result<u64, ConnectorError> {
    let ddl = dialect.create_table_sql(job)?;
    session.execute(&ddl).await?;

    let mut written = 0u64;
    for chunk in job.rows.chunks(batch_rows(job.fields.len())) {
        let values = chunk
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&job.fields)
                    .map(|(cell, field)| BindValue::parse(field.sql_type, cell.as_deref()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let insert = dialect.insert_sql(job, chunk.len());
        session.insert_rows(&insert, &values).await?;
        written += chunk.len() as u64;
        debug!("inserted batch of {} rows ({} total)", chunk.len(), written);
    }
    Ok(written)
}

/// Rows per insert statement for a table `width` columns wide.
fn batch_rows(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).max(1)
}

/// Where to load import data from and which table to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub url: String,
    pub database: String,
    pub collection: String,
    #[serde(default)]
    pub schema: Option<String>,
}

/// Loads `request.url`, parses it and hands the result to the driver.
pub async fn import_from_source(
    driver: &dyn BackendDriver,
    request: &ImportRequest,
) -> Result<u64, ConnectorError> {
    let source = load_source(&request.url).await?;
    if source.content_type != CSV_CONTENT_TYPE {
        return Err(ConnectorError::InvalidData(format!(
            "unsupported content type '{}', only {} can be imported",
            source.content_type, CSV_CONTENT_TYPE
        )));
    }
    let (fields, rows) = parse_csv(&source.bytes)?;
    let job = ImportJob {
        database: request.database.clone(),
        collection: request.collection.clone(),
        schema: request.schema.clone(),
        fields,
        rows,
    };
    driver.create_table_and_write(&job).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;
    use sqlgate_core::TypeField;
    use std::sync::{Arc, Mutex};

    /// Records what a session was asked to do; fails the n-th insert.
    #[derive(Default, Clone)]
    struct RecordingSession {
        pub log: Arc<Mutex<Vec<String>>>,
        pub values: Arc<Mutex<Vec<BindValue>>>,
        pub fail_on_insert: Option<usize>,
        inserts: usize,
    }

    #[async_trait]
    impl ImportSession for RecordingSession {
        async fn execute(&mut self, sql: &str) -> Result<(), ConnectorError> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(())
        }

        async fn insert_rows(
            &mut self,
            sql: &str,
            rows: &[Vec<BindValue>],
        ) -> Result<(), ConnectorError> {
            self.inserts += 1;
            if self.fail_on_insert == Some(self.inserts) {
                return Err(ConnectorError::QueryFailed("duplicate key".into()));
            }
            let cells: usize = rows.iter().map(Vec::len).sum();
            assert_eq!(sql.matches("CAST($").count(), cells);
            self.log.lock().unwrap().push(format!("insert {} rows", rows.len()));
            self.values.lock().unwrap().extend(rows.iter().flatten().cloned());
            Ok(())
        }

        async fn commit(self) -> Result<(), ConnectorError> {
            self.log.lock().unwrap().push("COMMIT".into());
            Ok(())
        }

        async fn rollback(self) -> Result<(), ConnectorError> {
            self.log.lock().unwrap().push("ROLLBACK".into());
            Ok(())
        }
    }

    fn job(rows: Vec<Vec<Option<&str>>>) -> ImportJob {
        ImportJob {
            database: "d".into(),
            collection: "t".into(),
            schema: None,
            fields: vec![
                TypeField::new("n", SqlType::Bigint),
                TypeField::new("s", SqlType::Varchar),
            ],
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.map(String::from)).collect())
                .collect(),
        }
    }

    #[tokio::test]
    async fn commits_after_ddl_and_one_batched_insert() {
        let session = RecordingSession::default();
        let log = session.log.clone();
        let values = session.values.clone();
        let rows = create_table_and_write(
            session,
            &PostgresDialect,
            &job(vec![vec![Some("1"), Some("a")], vec![None, None]]),
        )
        .await
        .unwrap();

        assert_eq!(rows, 2);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert!(log[0].starts_with("CREATE TABLE"));
        assert_eq!(log[1], "insert 2 rows");
        assert_eq!(log[2], "COMMIT");
        assert_eq!(
            *values.lock().unwrap(),
            vec![
                BindValue::Int(Some(1)),
                BindValue::Text(Some("a".into())),
                BindValue::Int(None),
                BindValue::Text(None),
            ]
        );
    }

    #[tokio::test]
    async fn large_imports_use_one_insert_per_chunk() {
        let session = RecordingSession::default();
        let log = session.log.clone();
        let total = 70_000;
        let rows = create_table_and_write(
            session,
            &PostgresDialect,
            &job((0..total).map(|_| vec![Some("7"), Some("x")]).collect()),
        )
        .await
        .unwrap();

        assert_eq!(rows, total as u64);
        assert_eq!(batch_rows(2), 32_767);
        let log = log.lock().unwrap();
        let inserts: Vec<&str> = log
            .iter()
            .filter(|l| l.starts_with("insert"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            inserts,
            vec!["insert 32767 rows", "insert 32767 rows", "insert 4466 rows"]
        );
        assert_eq!(log.last().unwrap(), "COMMIT");
    }

    #[test]
    fn batch_never_drops_below_one_row() {
        assert_eq!(batch_rows(0), MAX_BIND_PARAMS);
        assert_eq!(batch_rows(MAX_BIND_PARAMS * 2), 1);
    }

    #[tokio::test]
    async fn failed_batch_rolls_back() {
        let session = RecordingSession {
            fail_on_insert: Some(1),
            ..Default::default()
        };
        let log = session.log.clone();
        let err = create_table_and_write(
            session,
            &PostgresDialect,
            &job(vec![
                vec![Some("1"), Some("a")],
                vec![Some("2"), Some("b")],
                vec![Some("3"), Some("c")],
            ]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ConnectorError::QueryFailed(_)));
        let log = log.lock().unwrap();
        assert_eq!(log.last().unwrap(), "ROLLBACK");
        assert!(!log.iter().any(|l| l == "COMMIT"));
    }

    #[tokio::test]
    async fn bad_cell_rolls_back() {
        let session = RecordingSession::default();
        let log = session.log.clone();
        let err = create_table_and_write(
            session,
            &PostgresDialect,
            &job(vec![vec![Some("x"), Some("a")]]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidData(_)));
        assert_eq!(log.lock().unwrap().last().unwrap(), "ROLLBACK");
    }

    #[test]
    fn bind_value_parsing() {
        assert_eq!(
            BindValue::parse(SqlType::Boolean, Some("TRUE")).unwrap(),
            BindValue::Bool(Some(true))
        );
        assert_eq!(
            BindValue::parse(SqlType::Double, Some("1.5")).unwrap(),
            BindValue::Float(Some(1.5))
        );
        assert_eq!(
            BindValue::parse(SqlType::Date, Some("2024-01-01")).unwrap(),
            BindValue::Text(Some("2024-01-01".into()))
        );
        assert!(BindValue::parse(SqlType::Integer, Some("1.5")).is_err());
    }

    #[tokio::test]
    async fn padded_boolean_cells_import_as_booleans() {
        let (fields, rows) = parse_csv(b"a,flag\n1, true\n2, false\n").unwrap();
        assert_eq!(fields[1].sql_type, SqlType::Boolean);

        let session = RecordingSession::default();
        let values = session.values.clone();
        let job = ImportJob {
            database: "d".into(),
            collection: "t".into(),
            schema: None,
            fields,
            rows,
        };
        assert_eq!(create_table_and_write(session, &PostgresDialect, &job).await.unwrap(), 2);

        let values = values.lock().unwrap();
        assert_eq!(values[1], BindValue::Bool(Some(true)));
        assert_eq!(values[3], BindValue::Bool(Some(false)));
    }
}
