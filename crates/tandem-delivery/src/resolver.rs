use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use tandem_types::models::{Conversation, UserId};

use crate::error::{DeliveryResult, validate_pair};
use crate::store::{MessageStore, with_deadline};

/// Maps a pair of users to their one-to-one conversation, creating it on
/// first contact.
#[derive(Clone)]
pub struct ConversationResolver {
    store: Arc<dyn MessageStore>,
    store_timeout: Duration,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn MessageStore>, store_timeout: Duration) -> Self {
        Self { store, store_timeout }
    }

    /// Symmetric in its arguments. Self-conversations are rejected.
    pub async fn resolve(&self, user_a: UserId, user_b: UserId) -> DeliveryResult<Conversation> {
        validate_pair(user_a, user_b)?;

        let existing = with_deadline(
            "find_one_to_one",
            self.store_timeout,
            self.store.find_one_to_one(user_a, user_b),
        )
        .await?;

        if let Some(conversation) = existing {
            return Ok(conversation);
        }

        debug!("No conversation between users {} and {}, creating one", user_a, user_b);
        let conversation = self.store.create_one_to_one(user_a, user_b, Utc::now()).await?;

        Ok(conversation)
    }
}
