//! sqlgate Connectors - Backend drivers
//!
//! This crate provides the polymorphic driver layer of the gateway:
//! - PostgreSQL and MySQL drivers on `sqlx` pools
//! - the descriptor catalog and driver factories
//! - per-connector metadata caching
//! - the shared transactional import pipeline and CSV ingestion

pub mod cache;
pub mod csv_reader;
pub mod dialect;
pub mod encode;
pub mod error;
pub mod factory;
pub mod import;
pub mod live;
pub mod mysql;
pub mod postgres;
pub mod source;
pub mod stream;

pub use cache::MetadataCache;
pub use dialect::{Dialect, MySqlDialect, PostgresDialect};
pub use error::ConnectorError;
pub use factory::{ConnectorFactory, DriverCatalog, MySqlFactory, PoolSettings, PostgresFactory};
pub use import::{import_from_source, BindValue, ImportRequest, ImportSession};
pub use live::LiveConnector;
pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use stream::{DriverEvent, ExecutionId, RowStream};

use async_trait::async_trait;
use sqlgate_core::{CollectionRef, ImportJob, QueryContext, TypeField};

/// Capability set every backend driver implements.
///
/// One instance owns one connection pool; every method may be called
/// concurrently.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    /// Profile type this driver serves (e.g. `"PostgreSQL"`).
    fn backend_type(&self) -> &str;

    async fn list_databases(&self) -> Result<Vec<String>, ConnectorError>;

    async fn list_collections(&self, database: &str) -> Result<Vec<CollectionRef>, ConnectorError>;

    async fn get_schema(
        &self,
        database: &str,
        collection: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TypeField>, ConnectorError>;

    /// Starts `ctx.sql` and returns its row stream.
    ///
    /// The stream yields fields first and then at most `ctx.max_row + 1`
    /// rows, so the caller can tell a capped result from an exact fit.
    /// While the stream is open the statement is cancellable by `execution`.
    async fn execute_query(
        &self,
        ctx: &QueryContext,
        execution: ExecutionId,
    ) -> Result<RowStream, ConnectorError>;

    /// Interrupts the backend statement started under `execution`.
    /// Finished or unknown executions are ignored.
    async fn cancel(&self, execution: ExecutionId) -> Result<(), ConnectorError>;

    /// Creates the job's table and inserts its rows atomically.
    async fn create_table_and_write(&self, job: &ImportJob) -> Result<u64, ConnectorError>;

    /// Closes the pool. Further calls fail with `ConnectionFailed`.
    async fn close(&self);
}
