use axum::{routing::get, Router};

use crate::state::AppState;

use super::handlers;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        // One segment serves both feed ids ("/verge", "/verge.xml") and
        // proxy links ("/proxy.mp3", "/proxy_some-title.jpg"); the handler
        // dispatches on the slug.
        .route("/{slug}", get(handlers::dispatch))
        .with_state(state)
}
