// HTTP modules
mod routes_account; // Auth, settings and migration APIs
mod routes_events; // Countdown event APIs (incl. sharing)
mod routes_timers; // Timer APIs

use axum::{
    routing::{get, post, put},
    Router,
};
use countdown_sync::{AppContext, config::AppConfig};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("countdown_sync=info,tower_http=info")),
        )
        .init();

    // Load .env file if present (non-fatal if missing).
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("no .env file loaded: {e}");
    }

    let config = AppConfig::from_env();
    tracing::info!(
        data_dir = %config.data_dir.display(),
        remote = config.remote.is_complete(),
        "configuration loaded"
    );

    let ctx = AppContext::from_config(&config);
    ctx.gateway.initialize().await;

    let api = Router::new()
        // timers
        .route("/timers", get(routes_timers::list_timers).post(routes_timers::create_timer))
        .route(
            "/timers/:id",
            put(routes_timers::update_timer).delete(routes_timers::delete_timer),
        )
        // events
        .route("/events", get(routes_events::list_events).post(routes_events::create_event))
        .route("/events/linked", post(routes_events::add_linked_copy))
        .route(
            "/events/:id",
            put(routes_events::update_event).delete(routes_events::delete_event),
        )
        .route(
            "/events/:id/share",
            post(routes_events::enable_sharing).delete(routes_events::disable_sharing),
        )
        // settings
        .route("/settings", get(routes_account::get_settings).put(routes_account::put_settings))
        // auth
        .route("/auth", get(routes_account::get_auth))
        .route("/auth/sign-in", post(routes_account::sign_in))
        .route("/auth/sign-out", post(routes_account::sign_out))
        // migration
        .route("/migration", get(routes_account::get_migration))
        .route("/migration/confirm", post(routes_account::confirm_migration))
        .route("/migration/decline", post(routes_account::decline_migration))
        .with_state(ctx);

    let app = Router::new()
        .nest("/api", api)
        .nest_service("/", ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "bind failed");
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{addr}");
    tracing::info!("API base:     http://{addr}/api");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
    }
}
