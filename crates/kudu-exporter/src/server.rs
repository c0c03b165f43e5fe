//! HTTP exposition.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus text exposition (format 0.0.4) |
//! | GET | `/healthz` | Poll status as JSON |

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tracing::error;

use kudu_exporter_poller::{PollStats, SharedState};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub state: SharedState,
    pub stats: PollStats,
}

pub fn build_router(app: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(app)
}

/// GET /metrics
pub async fn metrics(State(app): State<AppState>) -> Response {
    match app.state.render().await {
        Ok(body) => (StatusCode::OK, [("content-type", TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render exposition");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub last_success_epoch: Option<u64>,
    pub consecutive_failures: i64,
    pub series: usize,
}

/// GET /healthz
pub async fn healthz(State(app): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        last_success_epoch: app.stats.last_success_epoch(),
        consecutive_failures: app.stats.consecutive_failures(),
        series: app.state.series_count().await,
    })
}
