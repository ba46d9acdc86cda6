//! HTTP surface of the gateway (Axum).
//!
//! Query results stream as newline-delimited JSON [`WireFrame`]s; a failed
//! stream ends with an `error` frame. Every other endpoint answers with
//! plain JSON, and errors map to status codes by class.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use sqlgate_connectors::ImportRequest;
use sqlgate_core::{
    ConnectorDescriptor, GatewayError, Profile, QueryContext, TypeField, WireError, WireFrame,
};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::health::health_router;
use crate::service::{Gateway, ImportResult};

pub const NDJSON: &str = "application/x-ndjson";
pub const QUERY_ID_HEADER: &str = "x-query-identifier";

/// Error response: `{"code", "message"}` with a class-specific status.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self.0 {
            GatewayError::Internal(detail) => {
                error!("internal error: {}", detail);
                "internal error".to_string()
            }
            other => other.message().to_string(),
        };
        let body = WireError {
            code: self.0.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub profile: String,
    pub sql: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub max_row: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ImportBody {
    pub profile: String,
    #[serde(flatten)]
    pub request: ImportRequest,
}

#[derive(Debug, Deserialize)]
pub struct SchemaParams {
    pub schema: Option<String>,
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    let metrics = gateway.metrics().clone();
    Router::new()
        .route("/api/configs", get(list_configs))
        .route("/api/profiles", get(list_profiles).post(upsert_profile))
        .route("/api/profiles/:name", delete(delete_profile))
        .route("/api/profiles/:profile/databases", get(list_databases))
        .route(
            "/api/profiles/:profile/databases/:database/collections",
            get(list_collections),
        )
        .route(
            "/api/profiles/:profile/databases/:database/collections/:collection/schema",
            get(collection_schema),
        )
        .route("/api/query", post(run_query))
        .route("/api/query/:identifier/cancel", post(cancel_query))
        .route("/api/import", post(import_file))
        .with_state(gateway)
        .merge(health_router(metrics))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

// GET /api/configs
async fn list_configs(State(gw): State<Arc<Gateway>>) -> Json<Vec<ConnectorDescriptor>> {
    Json(gw.available_configs())
}

// GET /api/profiles
async fn list_profiles(State(gw): State<Arc<Gateway>>) -> Json<Vec<Profile>> {
    Json(gw.get_profiles().await)
}

// POST /api/profiles
async fn upsert_profile(
    State(gw): State<Arc<Gateway>>,
    Json(profile): Json<Profile>,
) -> ApiResult<Vec<Profile>> {
    Ok(Json(gw.upsert_profile(profile).await?))
}

// DELETE /api/profiles/:name
async fn delete_profile(
    State(gw): State<Arc<Gateway>>,
    Path(name): Path<String>,
) -> ApiResult<Vec<Profile>> {
    Ok(Json(gw.delete_profile(&name).await?))
}

async fn list_databases(
    State(gw): State<Arc<Gateway>>,
    Path(profile): Path<String>,
) -> ApiResult<Vec<String>> {
    Ok(Json(gw.get_databases(&profile).await?))
}

async fn list_collections(
    State(gw): State<Arc<Gateway>>,
    Path((profile, database)): Path<(String, String)>,
) -> ApiResult<Vec<String>> {
    Ok(Json(gw.get_collections(&profile, &database).await?))
}

async fn collection_schema(
    State(gw): State<Arc<Gateway>>,
    Path((profile, database, collection)): Path<(String, String, String)>,
    Query(params): Query<SchemaParams>,
) -> ApiResult<Vec<TypeField>> {
    let schema = params.schema.filter(|s| !s.is_empty());
    Ok(Json(
        gw.get_collection_schema(&profile, &database, &collection, schema.as_deref())
            .await?,
    ))
}

// POST /api/query — NDJSON frame stream
async fn run_query(
    State(gw): State<Arc<Gateway>>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let ctx = QueryContext::new(req.sql, req.identifier, req.max_row);
    let handle = gw.query(&req.profile, ctx).await?;

    let lines = ReceiverStream::new(handle.frames).map(|item| {
        let frame = match &item {
            Ok(frame) => WireFrame::from(frame),
            Err(err) => WireFrame::from(err),
        };
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        Ok::<_, serde_json::Error>(Bytes::from(line))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON)
        .header(QUERY_ID_HEADER, handle.identifier.as_str())
        .body(Body::from_stream(lines))
        .map_err(|e| ApiError(GatewayError::internal(e.to_string())))
}

// POST /api/query/:identifier/cancel
async fn cancel_query(State(gw): State<Arc<Gateway>>, Path(identifier): Path<String>) -> StatusCode {
    gw.cancel_query(&identifier);
    StatusCode::NO_CONTENT
}

// POST /api/import
async fn import_file(
    State(gw): State<Arc<Gateway>>,
    Json(body): Json<ImportBody>,
) -> ApiResult<ImportResult> {
    Ok(Json(gw.import_from_file(&body.profile, body.request).await?))
}
