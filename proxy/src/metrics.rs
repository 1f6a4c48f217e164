//! `GET /metrics` (§6 "Metrics surface (ADDED)"), grounded directly on the
//! teacher's `routes::get_metrics`: autometrics text concatenated with the
//! process's own `prometheus::Registry`, gathered and encoded.

use crate::service_registry::LocalService;
use crate::state::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use prometheus::Encoder;
use prometheus::TextEncoder;
use std::sync::Arc;

pub struct MetricsService;

#[async_trait]
impl LocalService for MetricsService {
    fn matches(&self, path: &str) -> bool {
        path == "/metrics"
    }

    async fn handle(&self, state: &Arc<AppState>, _request: Request<Body>) -> Response {
        get_metrics(State(state.clone())).await.into_response()
    }
}

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let autometrics = match autometrics::prometheus_exporter::encode_to_string() {
        Ok(metrics) => metrics,
        Err(err) => {
            tracing::error!(%err, "could not collect autometrics");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:?}"));
        }
    };

    let encoder = TextEncoder::new();
    let metric_families = state.exporter.registry().gather();
    let mut result = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut result) {
        tracing::error!(%err, "could not collect opentelemetry metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:?}"));
    }

    let opentelemetry_metrics = match String::from_utf8(result) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(%err, "metrics encoder produced non-utf8 output");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:?}"));
        }
    };

    (StatusCode::OK, autometrics + &opentelemetry_metrics)
}
