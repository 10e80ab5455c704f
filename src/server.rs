//! HTTP exposition endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::exporter::Exporter;
use crate::registry::CONTENT_TYPE;

const INDEX_HTML: &str = r#"<html>
<head><title>WebAI Monitoring Exporter</title></head>
<body>
<h1>WebAI Monitoring Exporter</h1>
<p>Prometheus metrics available at <a href="/metrics">/metrics</a></p>
<p>Health check available at <a href="/health">/health</a></p>
</body>
</html>
"#;

/// Liveness payload
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Builds the router for `/`, `/metrics` and `/health`.
pub fn create_router(exporter: Arc<Exporter>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(exporter)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<Health> {
    Json(Health { status: "healthy" })
}

async fn metrics(State(exporter): State<Arc<Exporter>>) -> Response {
    if exporter.scrape_refresh() {
        let scrape_exporter = Arc::clone(&exporter);
        match tokio::task::spawn_blocking(move || scrape_exporter.refresh_counters()).await {
            Ok(Ok(_)) => {}
            // Serve whatever the registry already holds
            Ok(Err(e)) => warn!("Scrape refresh failed: {}", e),
            Err(e) => warn!("Scrape refresh task failed: {}", e),
        }
    }

    match exporter.render() {
        Ok(body) => {
            debug!("Serving /metrics ({} bytes)", body.len());
            ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
