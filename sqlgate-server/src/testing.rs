//! Scripted backend used by the server tests in place of a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sqlgate_connectors::stream::DriverEvent;
use sqlgate_connectors::{
    BackendDriver, ConnectorError, ConnectorFactory, DriverCatalog, ExecutionId, PoolSettings,
    RowStream,
};
use sqlgate_core::{
    CollectionRef, ConnectorDescriptor, ImportJob, Profile, QueryContext, SqlType, TypeField,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Script {
    open_instances: AtomicI64,
    fail_connect: AtomicBool,
    connect_delay: Mutex<Duration>,
    rows: AtomicUsize,
    row_delay: Mutex<Duration>,
    fail_after: Mutex<Option<usize>>,
    fail_import: AtomicBool,
    start_delay: Mutex<Duration>,
    fail_cancel: AtomicBool,
    database_calls: AtomicUsize,
    running: Mutex<HashMap<ExecutionId, CancellationToken>>,
    cancelled: Mutex<Vec<ExecutionId>>,
    imports: Mutex<Vec<ImportJob>>,
}

/// Shared knobs and counters for every fake driver a catalog opens.
#[derive(Clone, Default)]
pub struct FakeScript(Arc<Script>);

impl FakeScript {
    pub fn open_instances(&self) -> i64 {
        self.0.open_instances.load(Ordering::SeqCst)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.0.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.0.connect_delay.lock().unwrap() = delay;
    }

    /// Rows every query produces before the cap applies.
    pub fn set_rows(&self, rows: usize) {
        self.0.rows.store(rows, Ordering::SeqCst);
    }

    pub fn set_row_delay(&self, delay: Duration) {
        *self.0.row_delay.lock().unwrap() = delay;
    }

    /// Queries fail with a backend error after `rows` rows.
    pub fn fail_after(&self, rows: usize) {
        *self.0.fail_after.lock().unwrap() = Some(rows);
    }

    pub fn fail_import(&self, fail: bool) {
        self.0.fail_import.store(fail, Ordering::SeqCst);
    }

    /// Time `execute_query` takes before the statement is running.
    pub fn set_start_delay(&self, delay: Duration) {
        *self.0.start_delay.lock().unwrap() = delay;
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.0.fail_cancel.store(fail, Ordering::SeqCst);
    }

    pub fn database_calls(&self) -> usize {
        self.0.database_calls.load(Ordering::SeqCst)
    }

    /// Every execution a backend cancel was attempted for, in order.
    pub fn cancelled(&self) -> Vec<ExecutionId> {
        self.0.cancelled.lock().unwrap().clone()
    }

    pub fn imports(&self) -> Vec<ImportJob> {
        self.0.imports.lock().unwrap().clone()
    }
}

pub struct FakeDriver {
    script: FakeScript,
    closed: AtomicBool,
}

#[async_trait]
impl BackendDriver for FakeDriver {
    fn backend_type(&self) -> &str {
        "PostgreSQL"
    }

    async fn list_databases(&self) -> Result<Vec<String>, ConnectorError> {
        self.script.0.database_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["d".into(), "postgres".into()])
    }

    async fn list_collections(&self, _database: &str) -> Result<Vec<CollectionRef>, ConnectorError> {
        Ok(vec![
            CollectionRef::new(Some("public".into()), "orders"),
            CollectionRef::new(None, "users"),
        ])
    }

    async fn get_schema(
        &self,
        _database: &str,
        collection: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<TypeField>, ConnectorError> {
        if collection == "missing" {
            return Err(ConnectorError::CollectionNotFound(collection.to_string()));
        }
        Ok(vec![
            TypeField::new("id", SqlType::Integer),
            TypeField::new("name", SqlType::Varchar),
        ])
    }

    async fn execute_query(
        &self,
        ctx: &QueryContext,
        execution: ExecutionId,
    ) -> Result<RowStream, ConnectorError> {
        let start_delay = *self.script.0.start_delay.lock().unwrap();
        if !start_delay.is_zero() {
            tokio::time::sleep(start_delay).await;
        }
        if ctx.sql.contains("syntax error") {
            return Err(ConnectorError::QueryFailed(
                "syntax error at or near \"syntax\"".into(),
            ));
        }
        let total = self.script.0.rows.load(Ordering::SeqCst);
        let limit = total.min(ctx.max_row.saturating_add(1));
        let delay = *self.script.0.row_delay.lock().unwrap();
        let fail_after = *self.script.0.fail_after.lock().unwrap();
        let interrupted = CancellationToken::new();
        self.script
            .0
            .running
            .lock()
            .unwrap()
            .insert(execution, interrupted.clone());
        let script = self.script.clone();

        Ok(RowStream::spawn(4, move |tx| async move {
            produce(tx, limit, delay, fail_after, interrupted).await;
            script.0.running.lock().unwrap().remove(&execution);
        }))
    }

    async fn cancel(&self, execution: ExecutionId) -> Result<(), ConnectorError> {
        self.script.0.cancelled.lock().unwrap().push(execution);
        if self.script.0.fail_cancel.load(Ordering::SeqCst) {
            return Err(ConnectorError::ConnectionFailed("cancel connection refused".into()));
        }
        if let Some(token) = self.script.0.running.lock().unwrap().get(&execution) {
            token.cancel();
        }
        Ok(())
    }

    async fn create_table_and_write(&self, job: &ImportJob) -> Result<u64, ConnectorError> {
        if self.script.0.fail_import.load(Ordering::SeqCst) {
            return Err(ConnectorError::QueryFailed("duplicate key value".into()));
        }
        self.script.0.imports.lock().unwrap().push(job.clone());
        Ok(job.rows.len() as u64)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.script.0.open_instances.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Rows `1..=limit`; an interrupted statement fails like a backend cancel.
async fn produce(
    tx: sqlgate_connectors::stream::EventSender,
    limit: usize,
    delay: Duration,
    fail_after: Option<usize>,
    interrupted: CancellationToken,
) {
    let fields = vec![TypeField::new("n", SqlType::Bigint)];
    if tx.send(Ok(DriverEvent::Fields(fields))).await.is_err() {
        return;
    }
    for i in 0..limit {
        if fail_after == Some(i) {
            let _ = tx
                .send(Err(ConnectorError::QueryFailed("division by zero".into())))
                .await;
            return;
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = tx.closed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if interrupted.is_cancelled() {
            let _ = tx
                .send(Err(ConnectorError::QueryFailed(
                    "canceling statement due to user request".into(),
                )))
                .await;
            return;
        }
        let row = Bytes::from(format!("[{}]", i + 1));
        if tx.send(Ok(DriverEvent::Row(row))).await.is_err() {
            return;
        }
    }
}

/// Serves the PostgreSQL descriptor (and its `Postgres` alias) with fakes.
pub struct FakeFactory {
    descriptor: ConnectorDescriptor,
    script: FakeScript,
}

#[async_trait]
impl ConnectorFactory for FakeFactory {
    fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    fn aliases(&self) -> &[&'static str] {
        &["Postgres"]
    }

    async fn connect(
        &self,
        _profile: &Profile,
        _settings: &PoolSettings,
    ) -> Result<Arc<dyn BackendDriver>, ConnectorError> {
        let delay = *self.script.0.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.script.0.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectorError::ConnectionFailed(
                "could not connect to server: Connection refused".into(),
            ));
        }
        self.script.0.open_instances.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeDriver {
            script: self.script.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub fn fake_catalog(script: FakeScript) -> DriverCatalog {
    DriverCatalog::new(vec![Arc::new(FakeFactory {
        descriptor: sqlgate_connectors::postgres::descriptor(),
        script,
    })])
}

pub fn fake_profile(name: &str) -> Profile {
    Profile::new("Postgres", name)
        .with_config("endpoint", "h")
        .with_config("port", "5432")
        .with_config("database", "d")
}
