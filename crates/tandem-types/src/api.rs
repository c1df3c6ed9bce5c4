use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, UserId};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket upgrade.
/// Tokens are minted by the user service; this service only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: UserId,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub conversation_id: ConversationId,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -- Errors / health --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub database: String,
}
