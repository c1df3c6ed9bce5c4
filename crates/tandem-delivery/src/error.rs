use std::time::Duration;

use thiserror::Error;

use tandem_types::models::{ConversationId, UserId};

/// Failure reported by a `MessageStore`. A lookup that finds nothing is
/// not an error; stores return `None` or an empty list for that.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation `{operation}` timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("store task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("user {user_id} is not a participant in conversation {conversation_id}")]
    NotParticipant {
        user_id: UserId,
        conversation_id: ConversationId,
    },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl DeliveryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

pub(crate) fn validate_user(user_id: UserId) -> DeliveryResult<()> {
    if user_id <= 0 {
        return Err(DeliveryError::invalid(format!("malformed user id {}", user_id)));
    }
    Ok(())
}

/// Both ids well-formed and distinct; self-conversations are not supported.
pub(crate) fn validate_pair(user_a: UserId, user_b: UserId) -> DeliveryResult<()> {
    validate_user(user_a)?;
    validate_user(user_b)?;
    if user_a == user_b {
        return Err(DeliveryError::invalid("cannot start a conversation with yourself"));
    }
    Ok(())
}

pub(crate) fn validate_conversation(conversation_id: ConversationId) -> DeliveryResult<()> {
    if conversation_id <= 0 {
        return Err(DeliveryError::invalid(format!(
            "malformed conversation id {}",
            conversation_id
        )));
    }
    Ok(())
}
