use axum::{
    body::Bytes as BodyBytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::services::billing::verify_webhook_signature;
use crate::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Payment provider webhook endpoint.
///
/// The signature is verified over the raw body before any parsing, so the
/// route must never run behind body-transforming middleware. Verification
/// failures answer 400 with a plain-text reason; processing failures after a
/// valid signature are logged and acknowledged so the provider does not
/// retry events we cannot handle.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "billing",
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Signature verification failed"),
        (status = 500, description = "Webhook secret not configured")
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: BodyBytes,
) -> Response {
    let Some(secret) = state.config.stripe_webhook_secret.as_deref() else {
        error!("webhook received but stripe_webhook_secret is not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook secret is not configured",
        )
            .into_response();
    };

    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return webhook_error("missing stripe-signature header");
    };

    if let Err(e) = verify_webhook_signature(
        &body,
        signature,
        secret,
        state.config.stripe_webhook_tolerance_secs,
    ) {
        warn!("webhook signature rejected: {}", e);
        return webhook_error(&e.to_string());
    }

    let event: Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => return webhook_error(&format!("invalid JSON payload: {}", e)),
    };
    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let object = event
        .get("data")
        .and_then(|d| d.get("object"))
        .cloned()
        .unwrap_or(Value::Null);

    info!(event_type, "payment webhook received");
    if let Err(e) = state
        .services
        .billing
        .apply_provider_event(event_type, &object)
        .await
    {
        // Acknowledged anyway: the provider retries on non-2xx and the
        // failure is not recoverable by redelivery
        error!(event_type, "webhook processing failed: {}", e);
    }

    Json(json!({"received": true})).into_response()
}

fn webhook_error(reason: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!("Webhook Error: {}", reason),
    )
        .into_response()
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}
