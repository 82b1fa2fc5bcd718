// --------------------------------------------------
// Handles API endpoints for the signed-in account.
//
// Responsibilities:
// - Auth state, sign-in and sign-out
// - Get / update settings
// - Inspect, confirm or decline the local data migration
// -------------------------------------------------

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use countdown_sync::models::SettingsUpdate;
use countdown_sync::{AppContext, SyncError};

fn error_response(e: SyncError) -> axum::response::Response {
    let status = match e {
        SyncError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::Auth(_) => StatusCode::UNAUTHORIZED,
        SyncError::NoPendingMigration => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

// -----------------------------
// GET /api/settings
// -----------------------------
pub async fn get_settings(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.settings.settings())
}

// -----------------------------
// PUT /api/settings
// Body is a tagged update, e.g. {"op":"set_volume","volume":40}
// -----------------------------
pub async fn put_settings(
    State(ctx): State<AppContext>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    Json(ctx.settings.apply(update))
}

// -----------------------------
// GET /api/auth
// -----------------------------
pub async fn get_auth(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.gateway.state())
}

// -----------------------------
// POST /api/auth/sign-in
// -----------------------------
pub async fn sign_in(State(ctx): State<AppContext>) -> impl IntoResponse {
    match ctx.gateway.sign_in().await {
        Ok(identity) => Json(identity).into_response(),
        Err(e) => error_response(e),
    }
}

// -----------------------------
// POST /api/auth/sign-out
// -----------------------------
pub async fn sign_out(State(ctx): State<AppContext>) -> impl IntoResponse {
    ctx.flush().await;
    match ctx.gateway.sign_out().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

// -----------------------------
// GET /api/migration
// Pending offer, or null
// -----------------------------
pub async fn get_migration(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.migration.pending())
}

// -----------------------------
// POST /api/migration/confirm
// -----------------------------
pub async fn confirm_migration(State(ctx): State<AppContext>) -> impl IntoResponse {
    match ctx.migration.confirm().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

// -----------------------------
// POST /api/migration/decline
// -----------------------------
pub async fn decline_migration(State(ctx): State<AppContext>) -> impl IntoResponse {
    if ctx.migration.decline() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
