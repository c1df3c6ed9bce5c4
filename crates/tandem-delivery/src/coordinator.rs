use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use tandem_gateway::ConnectionRegistry;
use tandem_types::events::GatewayEvent;
use tandem_types::models::{Conversation, ConversationId, Message, NewMessage, UserId};

use crate::clock::MonotonicClock;
use crate::error::{DeliveryError, DeliveryResult, validate_conversation, validate_pair, validate_user};
use crate::resolver::ConversationResolver;
use crate::store::{MessageStore, with_deadline};

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Upper bound on a single push to a recipient's connection.
    pub push_timeout: Duration,
    /// Upper bound on each store read. Writes are bounded by the store.
    pub store_timeout: Duration,
    pub history_page_size: u32,
    pub max_history_page: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(2),
            store_timeout: Duration::from_secs(5),
            history_page_size: 50,
            max_history_page: 200,
        }
    }
}

/// Paging for history reads. Unset fields fall back to the configured page
/// size and offset 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Single entry point for sending direct messages and reading history.
pub struct DeliveryCoordinator {
    store: Arc<dyn MessageStore>,
    resolver: ConversationResolver,
    registry: ConnectionRegistry,
    clock: MonotonicClock,
    config: DeliveryConfig,
}

impl DeliveryCoordinator {
    pub fn new(store: Arc<dyn MessageStore>, registry: ConnectionRegistry, config: DeliveryConfig) -> Self {
        let resolver = ConversationResolver::new(Arc::clone(&store), config.store_timeout);
        Self {
            store,
            resolver,
            registry,
            clock: MonotonicClock::new(),
            config,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub async fn resolve(&self, user_a: UserId, user_b: UserId) -> DeliveryResult<Conversation> {
        self.resolver.resolve(user_a, user_b).await
    }

    /// Persist a message from `sender_id` to `recipient_id`, then push it to
    /// the recipient if they are connected.
    ///
    /// Fails only on invalid input or store failure. A failed push drops the
    /// recipient's connection but the send still succeeds; the message stays
    /// available through history.
    pub async fn send(&self, sender_id: UserId, recipient_id: UserId, content: String) -> DeliveryResult<Message> {
        validate_pair(sender_id, recipient_id)?;
        if content.is_empty() {
            return Err(DeliveryError::invalid("message content must not be empty"));
        }

        let conversation = self.resolver.resolve(sender_id, recipient_id).await?;

        let new_message = NewMessage {
            conversation_id: conversation.id,
            sender_id,
            content,
            created_at: self.clock.now(),
        };

        let message = self.store.save_message(new_message).await.map_err(|e| {
            error!(
                "Failed to store message from {} to {} in conversation {}: {}",
                sender_id, recipient_id, conversation.id, e
            );
            e
        })?;

        self.fan_out(recipient_id, &message).await;

        Ok(message)
    }

    async fn fan_out(&self, recipient_id: UserId, message: &Message) {
        let Some(handle) = self.registry.lookup(recipient_id).await else {
            debug!("User {} offline, message {} stored only", recipient_id, message.id);
            return;
        };

        let payload = match (GatewayEvent::MessageCreate { message: message.clone() }).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode message {} for push: {}", message.id, e);
                return;
            }
        };

        match handle.push(payload, self.config.push_timeout).await {
            Ok(()) => debug!("Pushed message {} to user {}", message.id, recipient_id),
            Err(e) => {
                warn!(
                    "Push of message {} to user {} failed ({}), dropping connection {}",
                    message.id,
                    recipient_id,
                    e,
                    handle.conn_id()
                );
                self.registry
                    .unregister_connection(recipient_id, handle.conn_id())
                    .await;
            }
        }
    }

    /// Newest-first history for a conversation. Does not check who is asking;
    /// use `get_history_for` on behalf of a user.
    pub async fn get_history(&self, conversation_id: ConversationId, page: HistoryPage) -> DeliveryResult<Vec<Message>> {
        validate_conversation(conversation_id)?;

        let max = self.config.max_history_page.max(1);
        let limit = page.limit.unwrap_or(self.config.history_page_size).clamp(1, max);
        let offset = page.offset.unwrap_or(0);

        let messages = with_deadline(
            "get_messages",
            self.config.store_timeout,
            self.store.get_messages(conversation_id, limit, offset),
        )
        .await?;

        Ok(messages)
    }

    /// History read on behalf of `requester`, who must be a participant.
    pub async fn get_history_for(
        &self,
        requester: UserId,
        conversation_id: ConversationId,
        page: HistoryPage,
    ) -> DeliveryResult<Vec<Message>> {
        validate_user(requester)?;
        validate_conversation(conversation_id)?;

        let conversation = with_deadline(
            "get_conversation",
            self.config.store_timeout,
            self.store.get_conversation(conversation_id),
        )
        .await?;
        if conversation.is_none() {
            return Err(DeliveryError::ConversationNotFound(conversation_id));
        }

        let member = with_deadline(
            "is_participant",
            self.config.store_timeout,
            self.store.is_participant(conversation_id, requester),
        )
        .await?;
        if !member {
            return Err(DeliveryError::NotParticipant {
                user_id: requester,
                conversation_id,
            });
        }

        self.get_history(conversation_id, page).await
    }

    pub async fn store_healthy(&self) -> bool {
        match with_deadline("ping", self.config.store_timeout, self.store.ping()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        }
    }
}
