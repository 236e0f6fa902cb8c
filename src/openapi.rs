use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health,
        crate::handlers::companies::create_company,
        crate::handlers::companies::list_companies,
        crate::handlers::companies::get_company,
        crate::handlers::companies::update_company,
        crate::handlers::companies::delete_company,
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::save_devices,
        crate::handlers::orders::save_pest_counts,
        crate::handlers::reports::generate_report,
        crate::handlers::reports::list_reports,
        crate::handlers::reports::download_report,
        crate::handlers::billing::billing_status,
        crate::handlers::billing::create_checkout_session,
        crate::handlers::billing::list_prices,
        crate::handlers::billing_webhooks::payment_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::auth::UserRole,
        crate::models::DeviceStatus,
        crate::models::StatusCount,
        crate::models::DeviceGroup,
        crate::models::PestTally,
        crate::models::DevicePestCount,
        crate::models::ClientRecord,
        crate::models::ProductApplication,
        crate::models::ServiceEntry,
        crate::models::Signatures,
        crate::models::CompanyProfile,
        crate::models::ServiceOrderReportData,
        crate::services::companies::CreateCompanyInput,
        crate::services::companies::UpdateCompanyInput,
        crate::services::orders::CreateOrderInput,
        crate::services::orders::UpdateOrderInput,
        crate::services::billing::BillingRecord,
        crate::services::reports::ReportSummary,
        crate::handlers::billing::CreateCheckoutSessionInput,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service probes"),
        (name = "companies", description = "Pest-control company profiles"),
        (name = "orders", description = "Service orders, device inspections and pest counts"),
        (name = "reports", description = "PDF report generation and retrieval"),
        (name = "billing", description = "Subscription status, checkout and provider webhooks"),
    ),
    info(
        title = "PestGuard API",
        description = "Backend for pest-control field operations and service-order reporting"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI at /swagger-ui backed by the generated document
pub fn swagger_router() -> Router<AppState> {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
