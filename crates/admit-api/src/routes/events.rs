//! # Change Feed API
//!
//! `GET /api/events?after=<seq>` returns retained events newer than `seq`
//! that the caller may see. Clients keep the returned `latest` and pass it
//! back as `after` on the next call.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::feed::ApplicationEvent;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Last sequence number already seen. Defaults to 0.
    #[serde(default)]
    pub after: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    /// Oldest first.
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<ApplicationEvent>,
    /// Sequence number of the newest published event.
    pub latest: u64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/events", get(list_events))
}

/// GET /api/events — Application events after a sequence number.
#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Events visible to the caller", body = EventsResponse),
        (status = 400, description = "Malformed sequence number", body = crate::error::ErrorBody),
    ),
    tag = "events"
)]
async fn list_events(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Json<EventsResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let feed = state.lifecycle.feed();
    let latest = feed.latest();
    let events = feed.since(query.after, &caller.actor());
    Ok(Json(EventsResponse { events, latest }))
}
