use crate::{Database, WriteWindow};
use crate::models::{ConversationRow, MessageRow};
use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::debug;

impl Database {
    // -- Conversations --

    pub fn create_conversation(&self, window: &WriteWindow, created_at: i64) -> Result<ConversationRow> {
        self.with_conn_mut(window, |conn| insert_conversation(conn, created_at))
    }

    pub fn add_participant(
        &self,
        window: &WriteWindow,
        conversation_id: i64,
        user_id: i64,
        joined_at: i64,
    ) -> Result<()> {
        self.with_conn_mut(window, |conn| insert_participant(conn, conversation_id, user_id, joined_at))
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Finds the non-group conversation that has both users as participants.
    pub fn find_one_to_one(&self, user_a: i64, user_b: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_one_to_one(conn, user_a, user_b))
    }

    /// Find-or-create for a user pair in a single transaction.
    /// Returns the conversation and whether it was created by this call.
    pub fn create_one_to_one(
        &self,
        window: &WriteWindow,
        user_a: i64,
        user_b: i64,
        created_at: i64,
    ) -> Result<(ConversationRow, bool)> {
        let (low, high) = if user_a < user_b { (user_a, user_b) } else { (user_b, user_a) };

        self.with_conn_mut(window, |conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT conversation_id FROM direct_pairs WHERE user_low = ?1 AND user_high = ?2",
                    rusqlite::params![low, high],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(conversation_id) = existing {
                let row = query_conversation(&tx, conversation_id)?
                    .ok_or_else(|| anyhow::anyhow!("direct pair points at missing conversation {}", conversation_id))?;
                tx.commit()?;
                return Ok((row, false));
            }

            let row = insert_conversation(&tx, created_at)?;
            insert_participant(&tx, row.id, low, created_at)?;
            insert_participant(&tx, row.id, high, created_at)?;
            tx.execute(
                "INSERT INTO direct_pairs (user_low, user_high, conversation_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![low, high, row.id],
            )?;
            tx.commit()?;

            debug!("Created direct conversation {} for users {} and {}", row.id, low, high);
            Ok((row, true))
        })
    }

    pub fn is_participant(&self, conversation_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
                    rusqlite::params![conversation_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        window: &WriteWindow,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
        created_at: i64,
    ) -> Result<MessageRow> {
        self.with_conn_mut(window, |conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![conversation_id, sender_id, content, created_at],
            )?;
            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                conversation_id,
                sender_id,
                content: content.to_string(),
                created_at,
            })
        })
    }

    /// Newest first; ties on `created_at` fall back to id order.
    pub fn get_messages(&self, conversation_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id, limit, offset))
    }
}

fn insert_conversation(conn: &Connection, created_at: i64) -> Result<ConversationRow> {
    conn.execute(
        "INSERT INTO conversations (is_group, created_at) VALUES (0, ?1)",
        [created_at],
    )?;
    Ok(ConversationRow {
        id: conn.last_insert_rowid(),
        is_group: false,
        created_at,
    })
}

fn insert_participant(conn: &Connection, conversation_id: i64, user_id: i64, joined_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO participants (conversation_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![conversation_id, user_id, joined_at],
    )?;
    Ok(())
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        is_group: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn query_conversation(conn: &Connection, id: i64) -> Result<Option<ConversationRow>> {
    let row = conn
        .query_row(
            "SELECT id, is_group, created_at FROM conversations WHERE id = ?1",
            [id],
            conversation_from_row,
        )
        .optional()?;

    Ok(row)
}

fn query_one_to_one(conn: &Connection, user_a: i64, user_b: i64) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.is_group, c.created_at
         FROM conversations c
         JOIN participants p1 ON p1.conversation_id = c.id AND p1.user_id = ?1
         JOIN participants p2 ON p2.conversation_id = c.id AND p2.user_id = ?2
         WHERE c.is_group = 0
         ORDER BY c.id
         LIMIT 1",
    )?;

    let row = stmt
        .query_row(rusqlite::params![user_a, user_b], conversation_from_row)
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, conversation_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, content, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![conversation_id, limit, offset], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
