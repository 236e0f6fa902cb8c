use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{policy, AuthenticatedUser};
use crate::errors::ServiceError;
use crate::services::billing::CheckoutRequest;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionInput {
    pub company_id: Uuid,
    /// Falls back to the configured default price
    pub price_id: Option<String>,
    /// Prefilled on the hosted checkout page
    pub customer_email: Option<String>,
    /// Falls back to the configured redirect URL
    pub success_url: Option<String>,
    /// Falls back to the configured redirect URL
    pub cancel_url: Option<String>,
}

/// Current subscription state for a company
#[utoipa::path(
    get,
    path = "/billing/status/{company_id}",
    tag = "billing",
    params(("company_id" = Uuid, Path, description = "Company id")),
    responses((status = 200, description = "Billing record", body = crate::services::billing::BillingRecord)),
    security(("bearer_auth" = []))
)]
pub async fn billing_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_member(&user, &state.owner_emails, company_id)?;
    let record = state
        .services
        .billing
        .subscription_status(&company_id.to_string())
        .await?;
    Ok(Json(record))
}

/// Starts a hosted checkout session for a company subscription
#[utoipa::path(
    post,
    path = "/billing/create-checkout-session",
    tag = "billing",
    request_body = CreateCheckoutSessionInput,
    responses(
        (status = 200, description = "Session id and redirect URL"),
        (status = 500, description = "Payment provider is not configured"),
        (status = 502, description = "Payment provider rejected the request")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateCheckoutSessionInput>,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_company_access(&user, &state.owner_emails, input.company_id)?;
    let request = CheckoutRequest {
        company_id: input.company_id.to_string(),
        price_id: input.price_id,
        customer_email: input.customer_email,
        success_url: input.success_url,
        cancel_url: input.cancel_url,
    };
    let session = state
        .services
        .billing
        .create_checkout_session(&request)
        .await?;
    Ok(Json(session))
}

/// Active subscription prices offered by the payment provider
#[utoipa::path(
    get,
    path = "/billing/prices",
    tag = "billing",
    responses(
        (status = 200, description = "Active prices with expanded products"),
        (status = 500, description = "Payment provider is not configured")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_prices(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let prices = state.services.billing.list_prices().await?;
    Ok(Json(prices))
}

pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/billing/status/:company_id", get(billing_status))
        .route("/billing/create-checkout-session", post(create_checkout_session))
        .route("/billing/prices", get(list_prices))
}
