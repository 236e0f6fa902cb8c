use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::service_order::{self, status};
use crate::entities::{company, counter};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{reconcile_group, DeviceGroup, DevicePestCount, ServiceEntry, Signatures};

const ORDER_COUNTER: &str = "service_order";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub company_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub client_name: String,
    pub client_address: Option<String>,
    pub client_contact: Option<String>,
    pub client_tax_id: Option<String>,
    pub scheduled_date: NaiveDate,
    pub technician_name: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

/// Partial update for visit details; device and pest data go through their
/// dedicated operations so reconciliation always runs.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderInput {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub technician_name: Option<String>,
    pub observations: Option<String>,
    pub signatures: Option<Signatures>,
    pub services: Option<Vec<ServiceEntry>>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Allocates the next sequential order number inside the caller's
    /// transaction, formatted as six digits ("000042").
    async fn next_order_number(txn: &DatabaseTransaction) -> Result<String, ServiceError> {
        let row = counter::Entity::find_by_id(ORDER_COUNTER).one(txn).await?;
        let next = match row {
            Some(row) => {
                let next = row.value + 1;
                let mut active: counter::ActiveModel = row.into();
                active.value = Set(next);
                active.update(txn).await?;
                next
            }
            None => {
                counter::ActiveModel {
                    name: Set(ORDER_COUNTER.to_string()),
                    value: Set(1),
                }
                .insert(txn)
                .await?;
                1
            }
        };
        Ok(format!("{:06}", next))
    }

    #[instrument(skip(self, input), fields(client = %input.client_name))]
    pub async fn create(&self, input: CreateOrderInput) -> Result<service_order::Model, ServiceError> {
        input.validate()?;

        let company = company::Entity::find_by_id(input.company_id)
            .one(&*self.db)
            .await?;
        if company.is_none() {
            return Err(ServiceError::NotFound(format!(
                "company {} not found",
                input.company_id
            )));
        }

        let txn = self.db.begin().await?;
        let order_number = Self::next_order_number(&txn).await?;
        let now = Utc::now();

        let model = service_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.clone()),
            company_id: Set(input.company_id),
            client_name: Set(input.client_name),
            client_address: Set(input.client_address),
            client_contact: Set(input.client_contact),
            client_tax_id: Set(input.client_tax_id),
            scheduled_date: Set(input.scheduled_date),
            start_time: Set(None),
            end_time: Set(None),
            technician_name: Set(input.technician_name),
            status: Set(status::SCHEDULED.to_string()),
            services: Set(serde_json::to_value(&input.services)?),
            device_groups: Set(json!([])),
            pest_counts: Set(json!([])),
            observations: Set(None),
            signatures: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let saved = model.insert(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send(Event::OrderCreated {
                order_id: saved.id,
                order_number,
            })
            .await;
        Ok(saved)
    }

    pub async fn get(&self, id: Uuid) -> Result<service_order::Model, ServiceError> {
        service_order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("service order {} not found", id)))
    }

    pub async fn get_by_number(&self, order_number: &str) -> Result<service_order::Model, ServiceError> {
        service_order::Entity::find()
            .filter(service_order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("service order {} not found", order_number))
            })
    }

    /// Orders for one company, newest first
    pub async fn list(&self, company_id: Uuid) -> Result<Vec<service_order::Model>, ServiceError> {
        Ok(service_order::Entity::find()
            .filter(service_order::Column::CompanyId.eq(company_id))
            .order_by_desc(service_order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateOrderInput,
    ) -> Result<service_order::Model, ServiceError> {
        input.validate()?;

        let existing = self.get(id).await?;
        if existing.status == status::FINISHED {
            return Err(ServiceError::Conflict(format!(
                "service order {} is finished and can no longer be edited",
                existing.order_number
            )));
        }

        let mut active: service_order::ActiveModel = existing.into();
        if let Some(start) = input.start_time {
            active.start_time = Set(Some(start));
        }
        if let Some(end) = input.end_time {
            active.end_time = Set(Some(end));
        }
        if let Some(tech) = input.technician_name {
            active.technician_name = Set(Some(tech));
        }
        if let Some(obs) = input.observations {
            active.observations = Set(Some(obs));
        }
        if let Some(signatures) = input.signatures {
            active.signatures = Set(Some(serde_json::to_value(&signatures)?));
        }
        if let Some(services) = input.services {
            active.services = Set(serde_json::to_value(&services)?);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Stores the inspected device groups. Each group is reconciled first:
    /// the "Conforme" entry is rebuilt as the complement of the non-compliant
    /// device numbers, so the stored breakdown always sums to the quantity.
    #[instrument(skip(self, groups))]
    pub async fn save_devices(
        &self,
        id: Uuid,
        groups: Vec<DeviceGroup>,
    ) -> Result<service_order::Model, ServiceError> {
        let existing = self.get(id).await?;
        if existing.status == status::FINISHED {
            return Err(ServiceError::Conflict(format!(
                "service order {} is finished and can no longer be edited",
                existing.order_number
            )));
        }

        let reconciled: Vec<DeviceGroup> = groups
            .iter()
            .map(reconcile_group)
            .collect::<Result<_, _>>()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let was_scheduled = existing.status == status::SCHEDULED;
        let mut active: service_order::ActiveModel = existing.into();
        active.device_groups = Set(serde_json::to_value(&reconciled)?);
        if was_scheduled {
            active.status = Set(status::IN_PROGRESS.to_string());
        }
        active.updated_at = Set(Utc::now());

        let saved = active.update(&*self.db).await?;
        self.event_sender
            .send(Event::DevicesRecorded {
                order_id: saved.id,
                group_count: reconciled.len(),
            })
            .await;
        Ok(saved)
    }

    /// Stores per-device pest tallies. Device numbers must refer to devices
    /// recorded by a previous `save_devices` call.
    #[instrument(skip(self, counts))]
    pub async fn save_pest_counts(
        &self,
        id: Uuid,
        counts: Vec<DevicePestCount>,
    ) -> Result<service_order::Model, ServiceError> {
        let existing = self.get(id).await?;
        if existing.status == status::FINISHED {
            return Err(ServiceError::Conflict(format!(
                "service order {} is finished and can no longer be edited",
                existing.order_number
            )));
        }

        let groups: Vec<DeviceGroup> = serde_json::from_value(existing.device_groups.clone())?;
        for count in &counts {
            let known = groups.iter().any(|g| {
                g.device_type == count.device_type
                    && count.device_number >= 1
                    && count.device_number <= g.quantity
            });
            if !known {
                return Err(ServiceError::ValidationError(format!(
                    "device {} of type '{}' was not recorded for this order",
                    count.device_number, count.device_type
                )));
            }
        }

        let device_count = counts.len();
        let mut active: service_order::ActiveModel = existing.into();
        active.pest_counts = Set(serde_json::to_value(&counts)?);
        active.updated_at = Set(Utc::now());

        let saved = active.update(&*self.db).await?;
        self.event_sender
            .send(Event::PestCountsRecorded {
                order_id: saved.id,
                device_count,
            })
            .await;
        Ok(saved)
    }

    /// Marks the order finished once its report has been produced
    pub(crate) async fn mark_finished(&self, id: Uuid) -> Result<service_order::Model, ServiceError> {
        let existing = self.get(id).await?;
        let mut active: service_order::ActiveModel = existing.into();
        active.status = Set(status::FINISHED.to_string());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, run_migrations};
    use crate::models::{DeviceStatus, PestTally, StatusCount};
    use crate::services::companies::{CompanyService, CreateCompanyInput};
    use tokio::sync::mpsc;

    async fn setup() -> (OrderService, Uuid) {
        let db = Arc::new(connect_in_memory().await.unwrap());
        run_migrations(&db).await.unwrap();
        let (tx, _rx) = mpsc::channel(64);
        let sender = EventSender::new(tx);

        let companies = CompanyService::new(db.clone(), sender.clone());
        let company = companies
            .create(CreateCompanyInput {
                name: "Dedetizadora Alfa".into(),
                cnpj: "12.345.678/0001-00".into(),
                phone: None,
                address: None,
                email: None,
                logo_url: None,
                environmental_license: None,
                sanitary_permit: None,
            })
            .await
            .unwrap();

        (OrderService::new(db, sender), company.id)
    }

    fn create_input(company_id: Uuid) -> CreateOrderInput {
        CreateOrderInput {
            company_id,
            client_name: "Padaria Central".into(),
            client_address: Some("Rua das Flores, 10".into()),
            client_contact: None,
            client_tax_id: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            technician_name: Some("João Silva".into()),
            services: vec![],
        }
    }

    #[tokio::test]
    async fn order_numbers_are_sequential_six_digits() {
        let (svc, company_id) = setup().await;
        let first = svc.create(create_input(company_id)).await.unwrap();
        let second = svc.create(create_input(company_id)).await.unwrap();
        assert_eq!(first.order_number, "000001");
        assert_eq!(second.order_number, "000002");
        assert_eq!(first.status, status::SCHEDULED);
    }

    #[tokio::test]
    async fn create_rejects_unknown_company() {
        let (svc, _) = setup().await;
        let err = svc.create(create_input(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn save_devices_reconciles_and_starts_order() {
        let (svc, company_id) = setup().await;
        let order = svc.create(create_input(company_id)).await.unwrap();

        let saved = svc
            .save_devices(
                order.id,
                vec![DeviceGroup {
                    device_type: "Armadilha".into(),
                    quantity: 10,
                    statuses: vec![StatusCount {
                        status: DeviceStatus::PragaEncontrada,
                        count: 0,
                        devices: vec![3, 7],
                    }],
                }],
            )
            .await
            .unwrap();

        assert_eq!(saved.status, status::IN_PROGRESS);
        let groups: Vec<DeviceGroup> = serde_json::from_value(saved.device_groups).unwrap();
        assert_eq!(groups[0].statuses[0].status, DeviceStatus::Conforme);
        assert_eq!(groups[0].statuses[0].count, 8);
    }

    #[tokio::test]
    async fn save_devices_rejects_out_of_range_numbers() {
        let (svc, company_id) = setup().await;
        let order = svc.create(create_input(company_id)).await.unwrap();

        let err = svc
            .save_devices(
                order.id,
                vec![DeviceGroup {
                    device_type: "Armadilha".into(),
                    quantity: 4,
                    statuses: vec![StatusCount {
                        status: DeviceStatus::Consumida,
                        count: 0,
                        devices: vec![9],
                    }],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn pest_counts_require_recorded_devices() {
        let (svc, company_id) = setup().await;
        let order = svc.create(create_input(company_id)).await.unwrap();

        let err = svc
            .save_pest_counts(
                order.id,
                vec![DevicePestCount {
                    device_type: "Armadilha".into(),
                    device_number: 1,
                    pests: vec![PestTally {
                        name: "Barata".into(),
                        count: 2,
                    }],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn finished_orders_are_immutable() {
        let (svc, company_id) = setup().await;
        let order = svc.create(create_input(company_id)).await.unwrap();
        svc.mark_finished(order.id).await.unwrap();

        let err = svc
            .update(
                order.id,
                UpdateOrderInput {
                    observations: Some("tarde demais".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
