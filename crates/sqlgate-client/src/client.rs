//! HTTP client for one gateway.
//!
//! `execute_sql` turns the gateway's newline-delimited frame stream back
//! into the JSON envelope, chunk by chunk, so a caller can forward it
//! without buffering the result set.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlgate_core::{
    ConnectorDescriptor, EnvelopeWriter, Profile, SchemaField, TypeField, WireError, WireFrame,
    DEFAULT_MAX_ROW,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::error::ClientError;
use crate::registry::ClientAuth;

/// Server-side query identifier used when the caller passes no flag.
pub const DEFAULT_FLAG: &str = "adhoc";

const STREAM_BUFFER: usize = 16;

type Chunk = Result<Bytes, ClientError>;
type CancelMap = Mutex<HashMap<String, (u64, CancellationToken)>>;

/// Where an import landed; `collection` is schema-qualified when a schema was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCollection {
    pub database: String,
    pub collection: String,
}

#[derive(Deserialize)]
struct ImportReply {
    database: String,
    #[serde(default)]
    schema: Option<String>,
    collection: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    profile: &'a str,
    sql: &'a str,
    identifier: &'a str,
    max_row: usize,
}

#[derive(Serialize)]
struct ImportBody<'a> {
    profile: &'a str,
    url: &'a str,
    database: &'a str,
    collection: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
}

pub struct GatewayClient {
    base: Url,
    http: reqwest::Client,
    cancels: Arc<CancelMap>,
    seq: AtomicU64,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    pub fn new(url: &str, auth: &ClientAuth) -> Result<Self, ClientError> {
        let base = Url::parse(url)?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(url.to_string()));
        }
        Ok(Self {
            base,
            http: auth.http_client()?,
            cancels: Arc::new(Mutex::new(HashMap::new())),
            seq: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        decode(self.http.get(url).send().await?).await
    }

    pub async fn list_available_configs(&self) -> Result<Vec<ConnectorDescriptor>, ClientError> {
        self.get_json(self.url(&["api", "configs"])?).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, ClientError> {
        self.get_json(self.url(&["api", "profiles"])?).await
    }

    pub async fn upsert_profile(&self, profile: &Profile) -> Result<Vec<Profile>, ClientError> {
        let resp = self
            .http
            .post(self.url(&["api", "profiles"])?)
            .json(profile)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn delete_profile(&self, name: &str) -> Result<Vec<Profile>, ClientError> {
        let resp = self
            .http
            .delete(self.url(&["api", "profiles", name])?)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn list_databases(&self, profile: &str) -> Result<Vec<String>, ClientError> {
        self.get_json(self.url(&["api", "profiles", profile, "databases"])?)
            .await
    }

    pub async fn list_collections(
        &self,
        profile: &str,
        database: &str,
    ) -> Result<Vec<String>, ClientError> {
        self.get_json(self.url(&["api", "profiles", profile, "databases", database, "collections"])?)
            .await
    }

    pub async fn get_collection_schema(
        &self,
        profile: &str,
        database: &str,
        collection: &str,
        schema: Option<&str>,
    ) -> Result<Vec<SchemaField>, ClientError> {
        let mut url = self.url(&[
            "api",
            "profiles",
            profile,
            "databases",
            database,
            "collections",
            collection,
            "schema",
        ])?;
        if let Some(schema) = schema.filter(|s| !s.is_empty()) {
            url.query_pairs_mut().append_pair("schema", schema);
        }
        let fields: Vec<TypeField> = self.get_json(url).await?;
        Ok(fields.iter().map(SchemaField::from).collect())
    }

    /// Runs `sql` and streams the result envelope.
    ///
    /// `identifier` keys the local cancel handler; `flag` is the identifier
    /// the gateway registers the query under.
    pub async fn execute_sql(
        &self,
        profile: &str,
        sql: &str,
        identifier: &str,
        max_row: Option<usize>,
        flag: Option<&str>,
    ) -> Result<EnvelopeStream, ClientError> {
        let body = QueryBody {
            profile,
            sql,
            identifier: flag.filter(|f| !f.is_empty()).unwrap_or(DEFAULT_FLAG),
            max_row: max_row.unwrap_or(DEFAULT_MAX_ROW),
        };
        let resp = self
            .http
            .post(self.url(&["api", "query"])?)
            .json(&body)
            .send()
            .await?;
        let resp = check(resp).await?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        if lock(&self.cancels)
            .insert(identifier.to_string(), (seq, token.clone()))
            .is_some()
        {
            debug!("replacing cancel handler for '{}'", identifier);
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let cancels = Arc::clone(&self.cancels);
        let key = identifier.to_string();
        tokio::spawn(async move {
            pump(resp, tx, token).await;
            let mut cancels = lock(&cancels);
            if cancels.get(&key).map(|(s, _)| *s) == Some(seq) {
                cancels.remove(&key);
            }
        });

        Ok(EnvelopeStream {
            identifier: identifier.to_string(),
            rx,
        })
    }

    /// Stops reading the stream registered under `identifier`. The response
    /// is dropped, which the gateway treats as a cancellation. Unknown
    /// identifiers are ignored.
    pub fn cancel_query(&self, identifier: &str) -> bool {
        match lock(&self.cancels).remove(identifier) {
            Some((_, token)) => {
                token.cancel();
                info!("cancelled query stream '{}'", identifier);
                true
            }
            None => false,
        }
    }

    pub async fn import_from_file(
        &self,
        profile: &str,
        url: &str,
        database: &str,
        collection: &str,
        schema: Option<&str>,
    ) -> Result<ImportedCollection, ClientError> {
        let body = ImportBody {
            profile,
            url,
            database,
            collection,
            schema: schema.filter(|s| !s.is_empty()),
        };
        let resp = self
            .http
            .post(self.url(&["api", "import"])?)
            .json(&body)
            .send()
            .await?;
        let reply: ImportReply = decode(resp).await?;
        let collection = match reply.schema {
            Some(schema) => format!("{}.{}", schema, reply.collection),
            None => reply.collection,
        };
        Ok(ImportedCollection {
            database: reply.database,
            collection,
        })
    }
}

fn lock(map: &CancelMap) -> MutexGuard<'_, HashMap<String, (u64, CancellationToken)>> {
    match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Turns a non-success response into [`ClientError::Remote`].
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.bytes().await?;
    match serde_json::from_slice::<WireError>(&body) {
        Ok(err) => Err(err.into()),
        Err(_) => Err(ClientError::Remote {
            code: format!("HTTP_{}", status.as_u16()),
            message: String::from_utf8_lossy(&body).into_owned(),
        }),
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let body = check(resp).await?.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Envelope bytes for one NDJSON line.
fn envelope_chunk(line: &[u8], writer: &mut EnvelopeWriter) -> Result<Bytes, ClientError> {
    let line = std::str::from_utf8(line)
        .map_err(|e| ClientError::Decode(e.to_string()))?
        .trim();
    if line.is_empty() {
        return Ok(Bytes::new());
    }
    let wire: WireFrame = serde_json::from_str(line)?;
    let frame = wire.into_result().map_err(|e| ClientError::Remote {
        code: e.code().to_string(),
        message: e.message().to_string(),
    })?;
    writer
        .write_frame(&frame)
        .map_err(|e| ClientError::Decode(e.to_string()))
}

async fn deliver(tx: &mpsc::Sender<Chunk>, token: &CancellationToken, chunk: Chunk) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(chunk) => sent.is_ok(),
    }
}

async fn pump(resp: reqwest::Response, tx: mpsc::Sender<Chunk>, token: CancellationToken) {
    let mut body = resp.bytes_stream();
    let mut writer = EnvelopeWriter::new();
    let mut pending = BytesMut::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tx.closed() => return,
            next = body.next() => next,
        };
        match next {
            None => {
                let tail = pending.split();
                match envelope_chunk(&tail, &mut writer) {
                    Ok(out) if out.is_empty() => {}
                    Ok(out) => {
                        if !deliver(&tx, &token, Ok(out)).await {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
                break;
            }
            Some(Err(e)) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
            Some(Ok(chunk)) => {
                pending.extend_from_slice(&chunk);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line = pending.split_to(pos + 1);
                    match envelope_chunk(&line, &mut writer) {
                        Ok(out) if out.is_empty() => {}
                        Ok(out) => {
                            if !deliver(&tx, &token, Ok(out)).await {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    drop(body);
    if token.is_cancelled() {
        debug!("query stream closed after local cancel");
    }
    let _ = tx.send(Ok(writer.finish())).await;
}

/// The envelope of one query as a stream of byte chunks.
///
/// The chunks concatenate to a complete envelope unless an error item
/// ends the stream early.
pub struct EnvelopeStream {
    identifier: String,
    rx: mpsc::Receiver<Chunk>,
}

impl EnvelopeStream {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Reads the whole envelope into memory.
    pub async fn into_bytes(mut self) -> Result<Bytes, ClientError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.rx.recv().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }
}

impl Stream for EnvelopeStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
