// --------------------------------------------------
// Handles API endpoints for countdown events.
//
// Responsibilities:
// - List / create / update / delete events
// - Enable / disable sharing (owner only)
// - Add linked copies of other users' events
// -------------------------------------------------

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use countdown_sync::AppContext;
use countdown_sync::models::{Event, EventUpdate};
use countdown_sync::sync::Mode;

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub mode: Mode,
    pub events: Vec<Event>,
}

// -----------------------------
// GET /api/events
// -----------------------------
pub async fn list_events(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(EventsResponse {
        mode: ctx.events.mode(),
        events: ctx.events.events(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventInput {
    pub name: String,
    pub target_timestamp: i64, // epoch millis
}

// -----------------------------
// POST /api/events
// -----------------------------
pub async fn create_event(
    State(ctx): State<AppContext>,
    Json(input): Json<CreateEventInput>,
) -> impl IntoResponse {
    if input.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "name required").into_response();
    }
    let event = ctx.events.add(input.name.trim(), input.target_timestamp);
    (StatusCode::CREATED, Json(event)).into_response()
}

// -----------------------------
// PUT /api/events/:id
// Body is a tagged update, e.g. {"op":"rename","name":"Launch"}
// -----------------------------
pub async fn update_event(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(update): Json<EventUpdate>,
) -> impl IntoResponse {
    match ctx.events.apply(&id, update) {
        Some(event) => Json(event).into_response(),
        None => (StatusCode::NOT_FOUND, "event not found or update not allowed").into_response(),
    }
}

// -----------------------------
// DELETE /api/events/:id
// -----------------------------
pub async fn delete_event(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if ctx.events.remove(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub share_id: String,
}

// -----------------------------
// POST /api/events/:id/share
// Returns the freshly minted share token
// -----------------------------
pub async fn enable_sharing(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match ctx.events.enable_sharing(&id) {
        Some(share_id) => Json(ShareResponse { share_id }).into_response(),
        None => (StatusCode::FORBIDDEN, "sharing not allowed").into_response(),
    }
}

// -----------------------------
// DELETE /api/events/:id/share
// -----------------------------
pub async fn disable_sharing(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if ctx.events.disable_sharing(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::FORBIDDEN
    }
}

// -----------------------------
// POST /api/events/linked
// Body is the original event as resolved from a share link
// -----------------------------
pub async fn add_linked_copy(
    State(ctx): State<AppContext>,
    Json(original): Json<Event>,
) -> impl IntoResponse {
    match ctx.events.add_linked_copy(&original) {
        Some(copy) => (StatusCode::CREATED, Json(copy)).into_response(),
        None => (StatusCode::FORBIDDEN, "sign in to add shared events").into_response(),
    }
}
