use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use tandem_db::{Database, WriteWindow, WriterBusy};
use tandem_db::models::{ConversationRow, MessageRow};
use tandem_types::models::{Conversation, ConversationId, Message, NewMessage, Participant, UserId};

use crate::error::StoreError;
use crate::store::MessageStore;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// `MessageStore` backed by the SQLite chat database. Every call runs on
/// the blocking pool so the async runtime never waits on disk I/O.
///
/// Writes wait at most `write_timeout` for the writer connection. A write
/// that did not start in time, or whose caller dropped the future first,
/// is skipped and reported as a timeout; a started write always completes.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    write_timeout: Duration,
}

/// Closes the write window when the awaiting future goes away.
struct AbandonOnDrop(WriteWindow);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    async fn write<F, T>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database, &WriteWindow) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let window = WriteWindow::new(self.write_timeout);
        let guard = AbandonOnDrop(window.clone());

        let result = self.blocking(move |db| f(db, &window)).await;
        drop(guard);

        match result {
            Err(StoreError::Backend(e)) if e.is::<WriterBusy>() => {
                warn!("Store write `{}` not started within {:?}", operation, self.write_timeout);
                Err(StoreError::Timeout {
                    operation,
                    after: self.write_timeout,
                })
            }
            other => other,
        }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StoreError::Task(e.to_string())
            })?
            .map_err(StoreError::from)
    }
}

fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_else(|| {
        warn!("Corrupt timestamp '{}' in chat database", micros);
        DateTime::default()
    })
}

fn conversation_from_row(row: ConversationRow) -> Conversation {
    Conversation {
        id: row.id,
        is_group: row.is_group,
        created_at: from_micros(row.created_at),
    }
}

fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: row.id,
        conversation_id: row.conversation_id,
        sender_id: row.sender_id,
        content: row.content,
        created_at: from_micros(row.created_at),
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_conversation(&self, created_at: DateTime<Utc>) -> Result<Conversation, StoreError> {
        let micros = created_at.timestamp_micros();
        let row = self
            .write("create_conversation", move |db, window| db.create_conversation(window, micros))
            .await?;
        Ok(conversation_from_row(row))
    }

    async fn add_participant(&self, participant: Participant) -> Result<(), StoreError> {
        let joined_at = participant.joined_at.timestamp_micros();
        self.write("add_participant", move |db, window| {
            db.add_participant(window, participant.conversation_id, participant.user_id, joined_at)
        })
        .await
    }

    async fn find_one_to_one(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = self.blocking(move |db| db.find_one_to_one(user_a, user_b)).await?;
        Ok(row.map(conversation_from_row))
    }

    /// Atomic find-or-create guarded by the `direct_pairs` uniqueness
    /// constraint; a caller that loses the race gets the winner's row.
    async fn create_one_to_one(
        &self,
        user_a: UserId,
        user_b: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Conversation, StoreError> {
        let micros = created_at.timestamp_micros();
        let (row, created) = self
            .write("create_one_to_one", move |db, window| {
                db.create_one_to_one(window, user_a, user_b, micros)
            })
            .await?;

        if created {
            info!("Created conversation {} for users {} and {}", row.id, user_a, user_b);
        }
        Ok(conversation_from_row(row))
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        let row = self.blocking(move |db| db.get_conversation(id)).await?;
        Ok(row.map(conversation_from_row))
    }

    async fn is_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        self.blocking(move |db| db.is_participant(conversation_id, user_id)).await
    }

    async fn save_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let micros = message.created_at.timestamp_micros();
        let row = self
            .write("save_message", move |db, window| {
                db.insert_message(
                    window,
                    message.conversation_id,
                    message.sender_id,
                    &message.content,
                    micros,
                )
            })
            .await?;
        Ok(message_from_row(row))
    }

    async fn get_messages(
        &self,
        conversation_id: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = self
            .blocking(move |db| db.get_messages(conversation_id, limit, offset))
            .await?;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.blocking(|db| db.ping()).await
    }
}
