use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{policy, AuthenticatedUser};
use crate::entities::{company, report_document, service_order};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    ClientRecord, CompanyProfile, DeviceGroup, DevicePestCount, ServiceEntry,
    ServiceOrderReportData, Signatures,
};
use crate::reports::{
    build_blocks, render_pdf, report_file_name, FixedMetrics, LayoutEngine, PageGeometry,
};
use crate::services::{BillingService, OrderService};

/// Produces, stores and serves the service-order PDF reports. Generation is
/// the "finish order" action: it runs the billing gate, reconciles the stored
/// device data, lays the report out and persists the artifact.
pub struct ReportService {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    billing: Arc<BillingService>,
    owner_emails: Vec<String>,
    event_sender: EventSender,
}

/// Listing row; the PDF bytes stay in the database until download
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: Uuid,
    pub order_number: String,
    pub file_name: String,
    pub client_name: String,
    pub service_type: Option<String>,
    pub technician_name: Option<String>,
    pub page_count: i32,
    pub created_at: chrono::DateTime<Utc>,
}

impl ReportService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        billing: Arc<BillingService>,
        owner_emails: Vec<String>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            orders,
            billing,
            owner_emails,
            event_sender,
        }
    }

    /// Generates the PDF for an order and marks it finished.
    ///
    /// The billing gate runs before any rendering work: client-role users
    /// always pass, owner emails bypass, everyone else needs an active
    /// subscription for the order's company. Nothing is persisted when the
    /// gate rejects.
    #[instrument(skip(self, user), fields(user = %user.user_id))]
    pub async fn generate(
        &self,
        user: &AuthenticatedUser,
        order_id: Uuid,
    ) -> Result<report_document::Model, ServiceError> {
        let order = self.orders.get(order_id).await?;
        let company = company::Entity::find_by_id(order.company_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("company {} not found", order.company_id))
            })?;

        let active = self
            .billing
            .is_active(&company.id.to_string())
            .await?;
        policy::allow_report_generation(user, &self.owner_emails, active)?;

        let profile = CompanyProfile::from(&company);
        let data = report_data_from_order(&order)?;
        let file_name = report_file_name(
            &data.client.name,
            &data.order_number,
            data.date,
            data.technician_name.as_deref(),
        );

        let geometry = PageGeometry::default();
        let metrics = FixedMetrics::new(geometry);
        let blocks = build_blocks(&profile, &data);
        let plan = LayoutEngine::new(geometry, &metrics).paginate(&blocks);
        let title = format!("Ordem De Serviço {}", data.order_number);
        let bytes = render_pdf(&title, &blocks, &plan, &geometry, &metrics)?;
        let page_count = plan.page_count as i32;

        let service_type = data
            .services
            .first()
            .map(|s| s.service_type.clone());

        // Regenerating replaces the previous artifact for the same order
        report_document::Entity::delete_many()
            .filter(report_document::Column::OrderNumber.eq(order.order_number.clone()))
            .exec(&*self.db)
            .await?;

        let saved = report_document::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order.order_number.clone()),
            file_name: Set(file_name),
            client_name: Set(order.client_name.clone()),
            service_type: Set(service_type),
            technician_name: Set(order.technician_name.clone()),
            content: Set(bytes),
            page_count: Set(page_count),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.orders.mark_finished(order.id).await?;

        info!(
            order_number = %saved.order_number,
            page_count,
            "report generated"
        );
        self.event_sender
            .send(Event::ReportGenerated {
                order_id: order.id,
                order_number: saved.order_number.clone(),
                page_count: page_count as usize,
            })
            .await;
        Ok(saved)
    }

    /// All stored reports, newest first, without the PDF payloads
    pub async fn list(&self) -> Result<Vec<ReportSummary>, ServiceError> {
        type Row = (
            Uuid,
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            i32,
            chrono::DateTime<Utc>,
        );
        let rows: Vec<Row> = report_document::Entity::find()
            .select_only()
            .column(report_document::Column::Id)
            .column(report_document::Column::OrderNumber)
            .column(report_document::Column::FileName)
            .column(report_document::Column::ClientName)
            .column(report_document::Column::ServiceType)
            .column(report_document::Column::TechnicianName)
            .column(report_document::Column::PageCount)
            .column(report_document::Column::CreatedAt)
            .order_by_desc(report_document::Column::CreatedAt)
            .into_tuple()
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    order_number,
                    file_name,
                    client_name,
                    service_type,
                    technician_name,
                    page_count,
                    created_at,
                )| {
                    ReportSummary {
                        id,
                        order_number,
                        file_name,
                        client_name,
                        service_type,
                        technician_name,
                        page_count,
                        created_at,
                    }
                },
            )
            .collect())
    }

    /// PDF bytes and download name for one order's report
    pub async fn download(&self, order_number: &str) -> Result<(String, Vec<u8>), ServiceError> {
        let doc = report_document::Entity::find()
            .filter(report_document::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no report stored for order {}", order_number))
            })?;
        Ok((doc.file_name, doc.content))
    }
}

/// Deserializes the order's JSON columns back into the typed report input
fn report_data_from_order(
    order: &service_order::Model,
) -> Result<ServiceOrderReportData, ServiceError> {
    let services: Vec<ServiceEntry> = serde_json::from_value(order.services.clone())?;
    let device_groups: Vec<DeviceGroup> = serde_json::from_value(order.device_groups.clone())?;
    let pest_counts: Vec<DevicePestCount> = serde_json::from_value(order.pest_counts.clone())?;
    let signatures: Option<Signatures> = order
        .signatures
        .clone()
        .map(serde_json::from_value)
        .transpose()?;

    Ok(ServiceOrderReportData {
        order_number: order.order_number.clone(),
        date: order.scheduled_date,
        start_time: order.start_time.clone(),
        end_time: order.end_time.clone(),
        client: ClientRecord {
            name: order.client_name.clone(),
            address: order.client_address.clone(),
            contact: order.client_contact.clone(),
            tax_id: order.client_tax_id.clone(),
        },
        technician_name: order.technician_name.clone(),
        services,
        device_groups,
        pest_counts,
        observations: order.observations.clone(),
        signatures,
    })
}
