//! Real-time delivery for direct messages: resolve the conversation for a
//! sender/recipient pair, persist the message, then push it to the
//! recipient's live connection if they have one.

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod resolver;
pub mod sqlite_store;
pub mod store;

pub use coordinator::{DeliveryConfig, DeliveryCoordinator, HistoryPage};
pub use error::{DeliveryError, DeliveryResult, StoreError};
pub use resolver::ConversationResolver;
pub use sqlite_store::SqliteStore;
pub use store::MessageStore;
