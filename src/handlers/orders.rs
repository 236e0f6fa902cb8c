use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::{policy, AuthenticatedUser};
use crate::errors::ServiceError;
use crate::models::{DeviceGroup, DevicePestCount};
use crate::services::orders::{CreateOrderInput, UpdateOrderInput};
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    /// Defaults to the caller's own company
    pub company_id: Option<Uuid>,
}

/// Schedules a new service order and allocates its sequential number
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "orders",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created with its allocated number"),
        (status = 403, description = "Caller is not staff of the company"),
        (status = 404, description = "Unknown company")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_staff(&user, &state.owner_emails, input.company_id)?;
    let order = state.services.orders.create(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Lists a company's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    params(ListOrdersQuery),
    responses((status = 200, description = "Orders of the selected company")),
    security(("bearer_auth" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let company_id = query
        .company_id
        .or(user.company_id)
        .ok_or_else(|| ServiceError::BadRequest("companyId is required".into()))?;
    policy::require_member(&user, &state.owner_emails, company_id)?;
    let orders = state.services.orders.list(company_id).await?;
    Ok(Json(orders))
}

/// Fetches one service order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order"),
        (status = 404, description = "Unknown order")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get(id).await?;
    policy::require_member(&user, &state.owner_emails, order.company_id)?;
    Ok(Json(order))
}

/// Updates visit details (times, technician, observations, signatures)
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderInput,
    responses(
        (status = 200, description = "Updated order"),
        (status = 409, description = "Order already finished")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get(id).await?;
    policy::require_staff(&user, &state.owner_emails, order.company_id)?;
    let updated = state.services.orders.update(id, input).await?;
    Ok(Json(updated))
}

/// Records the inspected device groups. The compliant entry is rebuilt
/// server-side so the per-status breakdown always sums to the quantity.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/devices",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = Vec<DeviceGroup>,
    responses(
        (status = 200, description = "Order with reconciled device groups"),
        (status = 400, description = "Device numbers out of range"),
        (status = 409, description = "Order already finished")
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_devices(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(groups): Json<Vec<DeviceGroup>>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get(id).await?;
    policy::require_staff(&user, &state.owner_emails, order.company_id)?;
    let updated = state.services.orders.save_devices(id, groups).await?;
    Ok(Json(updated))
}

/// Records per-device pest tallies
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/pest-counts",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = Vec<DevicePestCount>,
    responses(
        (status = 200, description = "Order with stored pest counts"),
        (status = 400, description = "Tally references an unrecorded device"),
        (status = 409, description = "Order already finished")
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_pest_counts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(counts): Json<Vec<DevicePestCount>>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get(id).await?;
    policy::require_staff(&user, &state.owner_emails, order.company_id)?;
    let updated = state.services.orders.save_pest_counts(id, counts).await?;
    Ok(Json(updated))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order).put(update_order))
        .route("/orders/:id/devices", put(save_devices))
        .route("/orders/:id/pest-counts", put(save_pest_counts))
}
