//! Field-service backend for pest-control operations: companies, service
//! orders with device inspections and pest counts, deterministic PDF report
//! generation, and a subscription billing gate fed by payment webhooks.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod reports;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::handlers::AppServices;

/// Shared application state; cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub owner_emails: Vec<String>,
    pub event_sender: EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
    ) -> Result<Self, ServiceError> {
        let services = AppServices::new(db.clone(), event_sender.clone(), &config)?;
        let owner_emails = config.owner_email_list();
        Ok(Self {
            db,
            config,
            owner_emails,
            event_sender,
            services,
        })
    }
}

/// CORS policy from configuration. Explicit origins are used when present;
/// development (or an explicit opt-in) falls back to a permissive policy.
pub fn build_cors(config: &AppConfig) -> Result<CorsLayer, ServiceError> {
    if config.has_cors_allowed_origins() {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(|o| {
                o.parse::<HeaderValue>().map_err(|_| {
                    ServiceError::ValidationError(format!("invalid CORS origin '{}'", o))
                })
            })
            .collect::<Result<_, _>>()?;

        info!(origins = origins.len(), "CORS restricted to configured origins");
        let mut cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        if config.cors_allow_credentials {
            cors = cors.allow_credentials(true);
        }
        Ok(cors)
    } else {
        warn!("CORS is permissive; do not use this outside development");
        Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any))
    }
}

/// Versioned API surface: companies, orders, reports
fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::companies::company_routes())
        .merge(handlers::orders::order_routes())
        .merge(handlers::reports::report_routes())
}

/// The full application router. The webhook route sits at the root, outside
/// the versioned API, because the provider URL is configured once and the
/// signature is computed over the unmodified body.
pub fn app_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .merge(handlers::health::health_routes())
        .merge(handlers::billing::billing_routes())
        .merge(handlers::billing_webhooks::webhook_routes())
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .with_state(state)
}
