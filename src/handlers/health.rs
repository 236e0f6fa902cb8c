use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::{db, AppState};

/// Liveness probe covering the database and the billing store
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "All components are up"),
        (status = 503, description = "A component is unreachable")
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match db::health_check(&state.db).await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!("database health check failed: {}", e);
            "down"
        }
    };
    let billing_store = match state.services.billing.store_health().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!("billing store health check failed: {}", e);
            "down"
        }
    };

    let healthy = database == "up" && billing_store == "up";
    let status = if healthy { "ok" } else { "degraded" };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(json!({
            "status": status,
            "database": database,
            "billing_store": billing_store,
        })),
    )
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
