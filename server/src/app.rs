//! Wires the route table. Any method other than GET on a registered path
//! gets axum's built-in 405; the install-script/static fallback is itself
//! GET-only for the same reason.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::{handlers, AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/_health", get(handlers::health))
        .route("/binary/*pkg", get(handlers::binary))
        .fallback_service(get(handlers::catch_all).with_state(state.clone()))
        .with_state(state)
}
