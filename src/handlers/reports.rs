use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{policy, AuthenticatedUser};
use crate::errors::ServiceError;
use crate::AppState;

/// Finishes an order by generating its PDF report.
///
/// Runs the billing gate first: client-role callers always pass, owner
/// emails bypass, anyone else needs an active subscription for the order's
/// company. A rejected call leaves the order untouched.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/report",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 201, description = "Report generated and stored"),
        (status = 402, description = "Subscription inactive"),
        (status = 404, description = "Unknown order")
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get(id).await?;
    policy::require_member(&user, &state.owner_emails, order.company_id)?;
    let document = state.services.reports.generate(&user, id).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Lists stored report metadata, newest first
#[utoipa::path(
    get,
    path = "/api/v1/reports",
    tag = "reports",
    responses((status = 200, description = "Stored reports without payloads")),
    security(("bearer_auth" = []))
)]
pub async fn list_reports(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let reports = state.services.reports.list().await?;
    Ok(Json(reports))
}

/// Downloads one report as an attachment named after the visit
#[utoipa::path(
    get,
    path = "/api/v1/reports/{order_number}/download",
    tag = "reports",
    params(("order_number" = String, Path, description = "Six-digit order number")),
    responses(
        (status = 200, description = "PDF bytes", body = Vec<u8>, content_type = "application/pdf"),
        (status = 404, description = "No report for this order")
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_report(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(order_number): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let (file_name, bytes) = state.services.reports.download(&order_number).await?;
    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ),
    ];
    Ok((headers, bytes))
}

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/:id/report", post(generate_report))
        .route("/reports", get(list_reports))
        .route("/reports/:order_number/download", get(download_report))
}
