pub mod auth;
pub mod error;
pub mod gateway;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All routes served by tandem. Layers (CORS, tracing) are left to the caller.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/messages/send", post(messages::send_message))
        .route("/api/v1/messages/history", get(messages::get_history))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(protected_routes)
        .route("/ws", get(gateway::ws_upgrade))
        .route("/health", get(health::health))
        .with_state(state)
}
