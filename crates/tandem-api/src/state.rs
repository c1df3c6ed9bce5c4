use std::sync::Arc;

use tandem_delivery::DeliveryCoordinator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub delivery: DeliveryCoordinator,
    pub jwt_secret: String,
    /// Outbound frame buffer per WebSocket connection.
    pub outbound_buffer: usize,
}
