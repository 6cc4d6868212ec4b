//! # admit-api — Axum API Service for Admissions
//!
//! HTTP surface of the admissions application lifecycle: program catalog,
//! draft applications, document uploads gated by per-program requirements,
//! staff review with an append-only status history, and a change feed.
//!
//! ## API Surface
//!
//! | Prefix                  | Module                    | Domain              |
//! |-------------------------|---------------------------|---------------------|
//! | `/api/applications/*`   | [`routes::applications`]  | Application lifecycle |
//! | `/api/documents/*`      | [`routes::documents`]     | Uploads, verification |
//! | `/api/programs/*`       | [`routes::programs`]      | Programs, requirements |
//! | `/api/departments`      | [`routes::programs`]      | Departments         |
//! | `/api/events`           | [`routes::events`]        | Change feed         |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros, served at `/openapi.json`.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod lifecycle;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod storage;
pub mod views;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;

pub use error::AppError;
pub use state::{AppConfig, AppState};

/// Body limit for JSON routes. The upload route sets its own.
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes, `/metrics` and `/openapi.json` are mounted outside the
/// auth middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();
    let metrics_on = state.config.metrics_enabled;

    let mut api = Router::new()
        .merge(routes::applications::router())
        .merge(routes::documents::router(state.config.max_upload_bytes))
        .merge(routes::programs::router())
        .merge(routes::events::router())
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .merge(openapi::router());

    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", axum::routing::get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics — Prometheus scrape endpoint.
///
/// Domain gauges are refreshed from the lifecycle on each scrape.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics.applications_total().reset();
    for (status, count) in state.lifecycle.status_counts() {
        metrics
            .applications_total()
            .with_label_values(&[status.as_str()])
            .set(count as f64);
    }

    let active = state
        .lifecycle
        .catalog()
        .active_programs(&Default::default())
        .len();
    metrics.programs_active().set(active as f64);
    metrics
        .change_feed_sequence()
        .set(state.lifecycle.feed().latest() as f64);

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe — always 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — 503 when the configured database is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}
