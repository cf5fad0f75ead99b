use crate::config::ApiConfig;
use crate::error::PollErrorKind;
use crate::metrics::Metrics;
use crate::report::troubleshooting_hints;
use crate::snapshot::Snapshot;
use crate::state::DashboardState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub state: Arc<RwLock<DashboardState>>,
    pub api: Arc<ApiConfig>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiState {
    pub started_at_unix: i64,
    pub last_update_unix: i64,
    pub last_success_unix: Option<i64>,
    pub state: &'static str,
    pub snapshot: Option<Snapshot>,
    pub error: Option<ApiError>,
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiError {
    pub kind: PollErrorKind,
    pub message: String,
    pub hints: Vec<String>,
}

impl ApiState {
    pub fn build(value: &DashboardState, api: &ApiConfig) -> Self {
        Self {
            started_at_unix: value.started_at_unix,
            last_update_unix: value.last_update_unix,
            last_success_unix: value.last_success_unix,
            state: value.current.as_str(),
            snapshot: value.current.snapshot().cloned(),
            error: value.current.error().map(|err| ApiError {
                kind: err.kind,
                message: err.message.clone(),
                hints: troubleshooting_hints(err, api),
            }),
            successful_polls: value.successful_polls,
            failed_polls: value.failed_polls,
            consecutive_failures: value.consecutive_failures,
        }
    }
}

pub fn build_router(
    metrics: Arc<Metrics>,
    state: Arc<RwLock<DashboardState>>,
    api: Arc<ApiConfig>,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/state", get(state_handler))
        .with_state(HttpAppState {
            metrics,
            state,
            api,
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

async fn state_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let guard = state.state.read().await;
    Json(ApiState::build(&guard, &state.api))
}
