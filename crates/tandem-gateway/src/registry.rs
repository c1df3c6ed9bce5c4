use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use tandem_types::models::UserId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("connection closed")]
    Closed,

    #[error("push timed out after {0:?}")]
    Timeout(Duration),
}

/// Writable end of a user's live connection.
///
/// Cloning is cheap; all clones share the outbound buffer and the close
/// signal, so closing any clone closes the connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
}

/// Read end owned by the connection task.
#[derive(Debug)]
pub struct HandleReceiver {
    rx: mpsc::Receiver<String>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Creates a handle with a bounded outbound buffer of `capacity` frames.
    pub fn new(capacity: usize) -> (Self, HandleReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
                closed: closed.clone(),
            },
            HandleReceiver { rx, closed },
        )
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue a serialized frame, waiting at most `timeout` for buffer space.
    pub async fn push(&self, payload: String, timeout: Duration) -> Result<(), PushError> {
        if self.is_closed() {
            return Err(PushError::Closed);
        }

        match self.tx.send_timeout(payload, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(PushError::Closed),
            Err(SendTimeoutError::Timeout(_)) => Err(PushError::Timeout(timeout)),
        }
    }

    /// Signal the connection task to shut the transport down. Never blocks.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

impl HandleReceiver {
    /// Next outbound frame, or `None` once the handle is closed or every
    /// sender is gone.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            frame = self.rx.recv() => frame,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Maps each online user to the handle of their single live connection.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` for the user, closing whatever handle it replaces.
    pub async fn register(&self, user_id: UserId, handle: ConnectionHandle) {
        let conn_id = handle.conn_id();
        let previous = self.inner.write().await.insert(user_id, handle);

        if let Some(previous) = previous {
            debug!(
                "User {} connection {} replaced by {}",
                user_id,
                previous.conn_id(),
                conn_id
            );
            previous.close();
        }
    }

    /// Remove and close the user's current handle. Returns whether one existed.
    pub async fn unregister(&self, user_id: UserId) -> bool {
        let removed = self.inner.write().await.remove(&user_id);

        match removed {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Like `unregister`, but only if the stored handle is still `conn_id`.
    /// A newer connection for the same user is left untouched.
    pub async fn unregister_connection(&self, user_id: UserId, conn_id: Uuid) -> bool {
        let removed = {
            let mut handles = self.inner.write().await;
            match handles.get(&user_id) {
                Some(current) if current.conn_id() == conn_id => handles.remove(&user_id),
                _ => None,
            }
        };

        match removed {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.get(&user_id).cloned()
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
