use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use tandem_gateway::connection;

use crate::error::ApiError;
use crate::middleware::{bearer_token, decode_claims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade. Browsers cannot set headers on a WebSocket request,
/// so the token may also come as `?token=`.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::Unauthorized("missing token".into()))?;

    let claims = decode_claims(token, &state.jwt_secret)?;
    info!("User {} opening gateway connection", claims.user_id);

    let registry = state.delivery.registry().clone();
    let capacity = state.outbound_buffer;
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, registry, claims.user_id, capacity)
    }))
}
