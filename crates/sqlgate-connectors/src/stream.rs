//! Row streams produced by backend drivers.
//!
//! A driver spawns one producer task per query that owns the pooled
//! connection and pushes [`DriverEvent`]s into a bounded channel. The
//! consumer side is a [`RowStream`]; closing it stops the producer at its
//! next suspension point and returns the connection to the pool.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use sqlgate_core::TypeField;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ConnectorError;

/// One item produced by a driver while executing a query.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// Column metadata; sent at most once, before any row.
    Fields(Vec<TypeField>),
    /// One row encoded as a JSON array.
    Row(Bytes),
}

/// Key of a single `execute_query` call.
///
/// Query identifiers are chosen by callers and may be shared by concurrent
/// queries; an execution id never is. Drivers track running statements by
/// execution id so a cancel reaches exactly one backend statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(u64);

impl ExecutionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec-{}", self.0)
    }
}

pub type EventSender = mpsc::Sender<Result<DriverEvent, ConnectorError>>;

/// Consumer end of a driver's row stream.
pub struct RowStream {
    rx: mpsc::Receiver<Result<DriverEvent, ConnectorError>>,
    task: Option<JoinHandle<()>>,
}

impl RowStream {
    /// Spawns `producer` with a channel of `buffer` slots.
    pub fn spawn<F, Fut>(buffer: usize, producer: F) -> Self
    where
        F: FnOnce(EventSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(producer(tx));
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Wraps a receiver fed by something other than a spawned producer.
    pub fn from_receiver(rx: mpsc::Receiver<Result<DriverEvent, ConnectorError>>) -> Self {
        Self { rx, task: None }
    }

    pub async fn next(&mut self) -> Option<Result<DriverEvent, ConnectorError>> {
        self.rx.recv().await
    }

    /// Stops the producer and waits until it has released its connection.
    pub async fn shutdown(mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("row producer ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.rx.close();
    }
}

/// Pumps a sqlx row stream into `tx`.
///
/// Sends `fields` first, then at most `limit` rows, and returns as soon as
/// the consumer goes away. The backend cursor is dropped on return.
pub async fn forward_rows<R, S, E>(
    tx: EventSender,
    fields: Vec<TypeField>,
    mut rows: S,
    limit: usize,
    encode: E,
) where
    S: Stream<Item = Result<R, sqlx::Error>> + Unpin,
    E: Fn(&R) -> Result<Bytes, ConnectorError>,
{
    if tx.send(Ok(DriverEvent::Fields(fields))).await.is_err() {
        return;
    }
    let mut sent = 0usize;
    while sent < limit {
        let item = tokio::select! {
            _ = tx.closed() => return,
            item = rows.next() => item,
        };
        let event = match item {
            None => return,
            Some(Ok(row)) => encode(&row).map(DriverEvent::Row),
            Some(Err(e)) => Err(ConnectorError::from(e)),
        };
        let failed = event.is_err();
        if tx.send(event).await.is_err() || failed {
            return;
        }
        sent += 1;
    }
    debug!("row limit {} reached, closing cursor", limit);
}
