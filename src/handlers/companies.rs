use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{policy, AuthenticatedUser};
use crate::errors::ServiceError;
use crate::services::companies::{CreateCompanyInput, UpdateCompanyInput};
use crate::AppState;

/// Registers a pest-control company. Owner accounts only.
#[utoipa::path(
    post,
    path = "/api/v1/companies",
    tag = "companies",
    request_body = CreateCompanyInput,
    responses(
        (status = 201, description = "Company created"),
        (status = 403, description = "Caller is not an owner account"),
        (status = 409, description = "CNPJ already registered")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreateCompanyInput>,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_owner(&user, &state.owner_emails)?;
    let company = state.services.companies.create(input).await?;
    Ok((StatusCode::CREATED, Json(company)))
}

/// Lists every registered company. Owner accounts only.
#[utoipa::path(
    get,
    path = "/api/v1/companies",
    tag = "companies",
    responses((status = 200, description = "All companies")),
    security(("bearer_auth" = []))
)]
pub async fn list_companies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_owner(&user, &state.owner_emails)?;
    let companies = state.services.companies.list().await?;
    Ok(Json(companies))
}

/// Fetches one company profile
#[utoipa::path(
    get,
    path = "/api/v1/companies/{id}",
    tag = "companies",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 200, description = "Company profile"),
        (status = 404, description = "Unknown company")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_member(&user, &state.owner_emails, id)?;
    let company = state.services.companies.get(id).await?;
    Ok(Json(company))
}

/// Updates a company profile. Owners, or admins of that company.
#[utoipa::path(
    put,
    path = "/api/v1/companies/{id}",
    tag = "companies",
    params(("id" = Uuid, Path, description = "Company id")),
    request_body = UpdateCompanyInput,
    responses(
        (status = 200, description = "Updated company"),
        (status = 403, description = "Caller cannot manage this company")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCompanyInput>,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_company_access(&user, &state.owner_emails, id)?;
    let company = state.services.companies.update(id, input).await?;
    Ok(Json(company))
}

/// Removes a company, its orders and their stored reports. Owner accounts
/// only.
#[utoipa::path(
    delete,
    path = "/api/v1/companies/{id}",
    tag = "companies",
    params(("id" = Uuid, Path, description = "Company id")),
    responses(
        (status = 204, description = "Company removed"),
        (status = 403, description = "Caller is not an owner account"),
        (status = 404, description = "Unknown company")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    policy::require_owner(&user, &state.owner_emails)?;
    state.services.companies.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn company_routes() -> Router<AppState> {
    Router::new()
        .route("/companies", get(list_companies).post(create_company))
        .route(
            "/companies/:id",
            get(get_company).put(update_company).delete(delete_company),
        )
}
