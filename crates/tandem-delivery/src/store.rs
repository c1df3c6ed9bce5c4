use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tandem_types::models::{Conversation, ConversationId, Message, NewMessage, Participant, UserId};

use crate::error::StoreError;

/// Durable storage consumed by the delivery core.
///
/// Implementations must:
/// - return `None` / empty results for lookups that find nothing
/// - assign message ids and confirm the stored `created_at`
/// - return messages newest first, ties broken by id
///
/// Reads may be cancelled at any point by dropping the returned future.
/// Writes bound their own wait: a write either never starts (reported as
/// `StoreError::Timeout`) or runs to completion, so callers must not wrap
/// them in `with_deadline`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_conversation(&self, created_at: DateTime<Utc>) -> Result<Conversation, StoreError>;

    async fn add_participant(&self, participant: Participant) -> Result<(), StoreError>;

    /// The non-group conversation with both users as participants, if any.
    async fn find_one_to_one(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Create a direct conversation for the pair and add both participants.
    ///
    /// The default is the plain three-step sequence, which can leave an
    /// orphaned conversation on partial failure and duplicates under a race.
    /// Stores that can do better (see `SqliteStore`) should override it with
    /// an atomic, conflict-tolerant version that returns the existing
    /// conversation when the pair already has one.
    async fn create_one_to_one(
        &self,
        user_a: UserId,
        user_b: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Conversation, StoreError> {
        let conversation = self.create_conversation(created_at).await?;
        for user_id in [user_a, user_b] {
            self.add_participant(Participant {
                conversation_id: conversation.id,
                user_id,
                joined_at: created_at,
            })
            .await?;
        }
        Ok(conversation)
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;

    async fn is_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    async fn save_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    async fn get_messages(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Bound a store read by `after`; expiry drops the call and reports a timeout.
pub async fn with_deadline<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| StoreError::Timeout { operation, after })?
}
