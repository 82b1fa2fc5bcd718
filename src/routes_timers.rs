// --------------------------------------------------
// Handles API endpoints for countdown timers.
//
// Responsibilities:
// - List / create / delete timers
// - Apply tagged updates (rename, duration, start, pause, ...)
// -------------------------------------------------

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use countdown_sync::AppContext;
use countdown_sync::models::{
    DEFAULT_TIMER_NAME, DEFAULT_TIMER_SECONDS, MAX_TIMERS, Timer, TimerUpdate,
};
use countdown_sync::sync::Mode;

#[derive(Debug, Serialize)]
pub struct TimersResponse {
    pub mode: Mode,
    pub timers: Vec<Timer>,
}

// -----------------------------
// GET /api/timers
// Returns every timer of the current mode
// -----------------------------
pub async fn list_timers(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(TimersResponse {
        mode: ctx.timers.mode(),
        timers: ctx.timers.timers(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimerInput {
    pub name: Option<String>,
    pub duration_seconds: Option<u32>,
}

// -----------------------------
// POST /api/timers
// Creates a timer; body fields are optional
// -----------------------------
pub async fn create_timer(
    State(ctx): State<AppContext>,
    input: Option<Json<CreateTimerInput>>,
) -> impl IntoResponse {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let name = input
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TIMER_NAME.to_string());
    let seconds = input.duration_seconds.unwrap_or(DEFAULT_TIMER_SECONDS);

    match ctx.timers.add_timer(&name, seconds) {
        Some(timer) => (StatusCode::CREATED, Json(timer)).into_response(),
        None => (
            StatusCode::CONFLICT,
            format!("timer limit of {MAX_TIMERS} reached"),
        )
            .into_response(),
    }
}

// -----------------------------
// PUT /api/timers/:id
// Body is a tagged update, e.g. {"op":"start"}
// -----------------------------
pub async fn update_timer(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(update): Json<TimerUpdate>,
) -> impl IntoResponse {
    match ctx.timers.apply(&id, update) {
        Some(timer) => Json(timer).into_response(),
        None => (StatusCode::NOT_FOUND, "timer not found").into_response(),
    }
}

// -----------------------------
// DELETE /api/timers/:id
// -----------------------------
pub async fn delete_timer(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if ctx.timers.remove(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
