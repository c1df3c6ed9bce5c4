use serde::{Deserialize, Serialize};

use crate::models::{Message, UserId};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is registered
    Ready { user_id: UserId },

    /// A direct message addressed to this user was persisted
    MessageCreate { message: Message },
}

impl GatewayEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
