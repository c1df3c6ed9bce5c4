pub mod config;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tandem_api::{AppState, AppStateInner};
use tandem_db::Database;
use tandem_delivery::{DeliveryCoordinator, SqliteStore};
use tandem_gateway::ConnectionRegistry;

use crate::config::Config;

/// Wire the store, registry and coordinator around an open database.
pub fn build_state(config: &Config, db: Database) -> AppState {
    let store = SqliteStore::new(Arc::new(db)).with_write_timeout(config.store_timeout);
    let delivery = DeliveryCoordinator::new(Arc::new(store), ConnectionRegistry::new(), config.delivery());

    Arc::new(AppStateInner {
        delivery,
        jwt_secret: config.jwt_secret.clone(),
        outbound_buffer: config.outbound_buffer,
    })
}

pub fn app(state: AppState) -> Router {
    tandem_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
