use axum::{
    Extension, Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
};
use tracing::debug;

use tandem_delivery::HistoryPage;
use tandem_types::api::{Claims, HistoryQuery, SendMessageRequest};
use tandem_types::models::Message;

use crate::error::ApiError;
use crate::state::AppState;

/// Send a direct message from the authenticated user to `recipient_id`.
/// The message is persisted before the response; the recipient is pushed
/// a `MessageCreate` event if connected.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let message = state
        .delivery
        .send(claims.user_id, req.recipient_id, req.content)
        .await?;

    debug!(
        "User {} sent message {} to user {}",
        claims.user_id, message.id, req.recipient_id
    );
    Ok(Json(message))
}

/// Newest-first history of a conversation the caller participates in.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let page = HistoryPage {
        limit: query.limit,
        offset: query.offset,
    };
    let messages = state
        .delivery
        .get_history_for(claims.user_id, query.conversation_id, page)
        .await?;

    Ok(Json(messages))
}
