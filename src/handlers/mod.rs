pub mod billing;
pub mod billing_webhooks;
pub mod companies;
pub mod health;
pub mod orders;
pub mod reports;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{BillingService, CompanyService, OrderService, ReportService};

/// The service layer, built once at startup and shared through [`crate::AppState`]
#[derive(Clone)]
pub struct AppServices {
    pub companies: CompanyService,
    pub orders: OrderService,
    pub billing: Arc<BillingService>,
    pub reports: Arc<ReportService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let companies = CompanyService::new(db.clone(), event_sender.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone());
        let billing = BillingService::new(config, event_sender.clone())?;
        let reports = Arc::new(ReportService::new(
            db,
            orders.clone(),
            billing.clone(),
            config.owner_email_list(),
            event_sender,
        ));

        Ok(Self {
            companies,
            orders,
            billing,
            reports,
        })
    }
}
