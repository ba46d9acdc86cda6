//! Health and metrics HTTP endpoints (Axum).

use axum::{extract::State, routing::get, Router};

use crate::metrics::GatewayMetrics;

pub fn health_router(metrics: GatewayMetrics) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .with_state(metrics)
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics_text(State(metrics): State<GatewayMetrics>) -> String {
    metrics.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_returns_ok() {
        let resp = health_router(GatewayMetrics::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        let metrics = GatewayMetrics::new();
        metrics.live_connectors.set(3);
        let resp = health_router(metrics)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("sqlgate_live_connectors 3"));
    }
}
