//! Streaming query pipeline and the cancel-handle registry.
//!
//! Each query runs in its own task that pulls [`DriverEvent`]s from the
//! driver's [`RowStream`] and forwards them as [`ResultFrame`]s. The task
//! ends in exactly one [`QueryOutcome`]:
//!
//! - `Completed` when the cursor is exhausted within the row cap
//! - `Truncated` when the driver yields a row past the cap; `Truncated(true)`
//!   is the last frame
//! - `Cancelled` on [`CancelRegistry::cancel`] or when the consumer drops
//!   the frame receiver; no frame follows
//! - `Failed` on a backend error, which is sent as the last item
//!
//! The cancel handle is unregistered only after the driver stream has been
//! shut down and its connection released. Backend statements are cancelled
//! by [`ExecutionId`], never by the caller's identifier, which concurrent
//! queries may share.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sqlgate_connectors::{BackendDriver, DriverEvent, ExecutionId, LiveConnector, RowStream};
use sqlgate_core::{GatewayError, QueryContext, QueryOutcome, ResultFrame, SchemaField};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::GatewayMetrics;

pub type FrameResult = Result<ResultFrame, GatewayError>;

struct CancelEntry {
    seq: u64,
    token: CancellationToken,
}

/// Process-wide map of in-flight query identifiers to cancel handles.
#[derive(Default)]
pub struct CancelRegistry {
    handles: Mutex<HashMap<String, CancelEntry>>,
    seq: AtomicU64,
}

impl CancelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, CancelEntry>> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers `identifier`; the entry lives as long as the guard. A later
    /// registration under the same identifier takes over the key.
    pub fn register(self: &Arc<Self>, identifier: &str) -> CancelGuard {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.handles().insert(
            identifier.to_string(),
            CancelEntry {
                seq,
                token: token.clone(),
            },
        );
        if previous.is_some() {
            warn!("query identifier '{}' reused while still running", identifier);
        }
        CancelGuard {
            registry: Arc::clone(self),
            identifier: identifier.to_string(),
            seq,
            token,
        }
    }

    /// Signals the query registered under `identifier`. Returns `false` if
    /// none is running.
    pub fn cancel(&self, identifier: &str) -> bool {
        match self.handles().get(identifier) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registration of one running query. Dropping it removes the entry it
/// created, and nothing else.
pub struct CancelGuard {
    registry: Arc<CancelRegistry>,
    identifier: String,
    seq: u64,
    token: CancellationToken,
}

impl CancelGuard {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let mut handles = self.registry.handles();
        if handles.get(&self.identifier).map(|e| e.seq) == Some(self.seq) {
            handles.remove(&self.identifier);
        }
    }
}

/// A running query: its frames and, once finished, its outcome.
pub struct QueryHandle {
    pub identifier: String,
    pub execution: ExecutionId,
    pub frames: mpsc::Receiver<FrameResult>,
    pub outcome: oneshot::Receiver<QueryOutcome>,
}

impl QueryHandle {
    /// Drains every frame, then waits for the outcome.
    pub async fn collect(mut self) -> (Vec<FrameResult>, QueryOutcome) {
        let mut frames = Vec::new();
        while let Some(frame) = self.frames.recv().await {
            frames.push(frame);
        }
        let outcome = self.outcome.await.unwrap_or(QueryOutcome::Cancelled);
        (frames, outcome)
    }
}

#[derive(Clone)]
pub struct QueryPipeline {
    cancels: Arc<CancelRegistry>,
    metrics: GatewayMetrics,
    buffer: usize,
}

impl QueryPipeline {
    pub fn new(cancels: Arc<CancelRegistry>, metrics: GatewayMetrics, buffer: usize) -> Self {
        Self {
            cancels,
            metrics,
            buffer: buffer.max(1),
        }
    }

    pub fn cancels(&self) -> &Arc<CancelRegistry> {
        &self.cancels
    }

    /// Starts `ctx` on `live`. An empty identifier is replaced by a fresh
    /// UUID so every query can be cancelled by key.
    pub async fn execute(
        &self,
        live: Arc<LiveConnector>,
        mut ctx: QueryContext,
    ) -> Result<QueryHandle, GatewayError> {
        ctx.validate()?;
        if ctx.identifier.trim().is_empty() {
            ctx.identifier = uuid::Uuid::new_v4().to_string();
        }
        let guard = self.cancels.register(&ctx.identifier);
        let driver = Arc::clone(&live.driver);
        let execution = ExecutionId::next();

        let rows = tokio::select! {
            started = driver.execute_query(&ctx, execution) => started.map_err(|e| {
                let err = GatewayError::from(e);
                self.metrics.query_finished("failed");
                warn!("query '{}' on '{}' failed to start: {}", ctx.identifier, live.profile_name, err);
                err
            })?,
            _ = guard.token().cancelled() => {
                // The driver may have registered the statement before the
                // future was dropped.
                if let Err(e) = driver.cancel(execution).await {
                    warn!("backend cancel for '{}' ({}) failed: {}", ctx.identifier, execution, e);
                }
                self.metrics.query_finished("cancelled");
                info!("query '{}' cancelled before it started", ctx.identifier);
                let (_, frames) = mpsc::channel(1);
                let (outcome_tx, outcome) = oneshot::channel();
                let _ = outcome_tx.send(QueryOutcome::Cancelled);
                return Ok(QueryHandle {
                    identifier: ctx.identifier.clone(),
                    execution,
                    frames,
                    outcome,
                });
            }
        };

        info!(
            "query '{}' streaming from '{}' (max_row {})",
            ctx.identifier, live.profile_name, ctx.max_row
        );
        let (tx, frames) = mpsc::channel(self.buffer);
        let (outcome_tx, outcome) = oneshot::channel();
        let identifier = ctx.identifier.clone();
        let metrics = self.metrics.clone();
        metrics.active_queries.inc();
        tokio::spawn(async move {
            let outcome = drive(rows, driver, execution, ctx, &guard, tx, &metrics).await;
            metrics.active_queries.dec();
            metrics.query_finished(outcome.label());
            info!("query '{}' finished: {}", guard.identifier(), outcome.label());
            drop(guard);
            let _ = outcome_tx.send(outcome);
        });

        Ok(QueryHandle {
            identifier,
            execution,
            frames,
            outcome,
        })
    }
}

async fn drive(
    mut rows: RowStream,
    driver: Arc<dyn BackendDriver>,
    execution: ExecutionId,
    ctx: QueryContext,
    guard: &CancelGuard,
    tx: mpsc::Sender<FrameResult>,
    metrics: &GatewayMetrics,
) -> QueryOutcome {
    let token = guard.token();
    let mut forwarded = 0u64;

    let outcome = loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break QueryOutcome::Cancelled,
            _ = tx.closed() => {
                debug!("consumer of '{}' went away", ctx.identifier);
                break QueryOutcome::Cancelled;
            }
            event = rows.next() => event,
        };
        let frame = match event {
            None => break QueryOutcome::Completed { rows: forwarded },
            Some(Ok(DriverEvent::Fields(fields))) => {
                ResultFrame::Fields(fields.iter().map(SchemaField::from).collect())
            }
            Some(Ok(DriverEvent::Row(_))) if forwarded as usize >= ctx.max_row => {
                if deliver(&tx, token, Ok(ResultFrame::Truncated(true))).await {
                    break QueryOutcome::Truncated { rows: forwarded };
                }
                break QueryOutcome::Cancelled;
            }
            Some(Ok(DriverEvent::Row(row))) => ResultFrame::Row(row),
            Some(Err(e)) => {
                let err = GatewayError::from(e);
                warn!("query '{}' failed: {}", ctx.identifier, err);
                deliver(&tx, token, Err(err.clone())).await;
                break QueryOutcome::Failed(err);
            }
        };
        let is_row = matches!(frame, ResultFrame::Row(_));
        if !deliver(&tx, token, Ok(frame)).await {
            break QueryOutcome::Cancelled;
        }
        if is_row {
            forwarded += 1;
            metrics.rows_streamed.inc();
        }
    };

    if outcome == QueryOutcome::Cancelled {
        info!("cancelling backend statement for '{}' ({})", ctx.identifier, execution);
        if let Err(e) = driver.cancel(execution).await {
            warn!("backend cancel for '{}' ({}) failed: {}", ctx.identifier, execution, e);
        }
    }
    rows.shutdown().await;
    outcome
}

/// Sends `item` unless the query is cancelled or the consumer is gone first.
async fn deliver(
    tx: &mpsc::Sender<FrameResult>,
    token: &CancellationToken,
    item: FrameResult,
) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}
