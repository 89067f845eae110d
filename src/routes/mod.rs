pub mod api;
pub mod ws;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Every route the server exposes, with state applied
pub fn create_app(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(ws::create_ws_router())
        .with_state(state)
}
