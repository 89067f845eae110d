use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router
///
/// Devices authenticate during the upgrade handshake (see
/// [`crate::auth::DeviceAuthenticator`]); the router itself carries no auth
/// layer. The handler needs the peer address, so the app must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws::ws_voice_handler))
        .layer(TraceLayer::new_for_http())
}
