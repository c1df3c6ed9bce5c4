pub mod connection;
pub mod registry;

pub use registry::{ConnectionHandle, ConnectionRegistry, HandleReceiver, PushError};
