use axum::{Json, extract::State, http::StatusCode};

use tandem_types::api::HealthResponse;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = state.delivery.store_healthy().await;

    let (status, code, database) = if database_ok {
        ("ok", StatusCode::OK, "ok")
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        code,
        Json(HealthResponse {
            status: status.into(),
            service: "tandem".into(),
            database: database.into(),
        }),
    )
}
