use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{company, report_document, service_order};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::CompanyProfile;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 30))]
    pub cnpj: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub logo_url: Option<String>,
    pub environmental_license: Option<String>,
    pub sanitary_permit: Option<String>,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompanyInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub logo_url: Option<String>,
    pub environmental_license: Option<String>,
    pub sanitary_permit: Option<String>,
}

#[derive(Clone)]
pub struct CompanyService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CompanyService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateCompanyInput) -> Result<company::Model, ServiceError> {
        input.validate()?;

        let existing = company::Entity::find()
            .filter(company::Column::Cnpj.eq(input.cnpj.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "a company with CNPJ {} already exists",
                input.cnpj
            )));
        }

        let now = Utc::now();
        let model = company::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            cnpj: Set(input.cnpj),
            phone: Set(input.phone),
            address: Set(input.address),
            email: Set(input.email),
            logo_url: Set(input.logo_url),
            environmental_license: Set(input.environmental_license),
            sanitary_permit: Set(input.sanitary_permit),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let saved = model.insert(&*self.db).await?;
        self.event_sender.send(Event::CompanyCreated(saved.id)).await;
        Ok(saved)
    }

    pub async fn get(&self, id: Uuid) -> Result<company::Model, ServiceError> {
        company::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("company {} not found", id)))
    }

    pub async fn list(&self) -> Result<Vec<company::Model>, ServiceError> {
        Ok(company::Entity::find()
            .order_by_asc(company::Column::Name)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateCompanyInput,
    ) -> Result<company::Model, ServiceError> {
        input.validate()?;

        let existing = self.get(id).await?;
        let mut active: company::ActiveModel = existing.into();

        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(phone) = input.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = input.address {
            active.address = Set(Some(address));
        }
        if let Some(email) = input.email {
            active.email = Set(Some(email));
        }
        if let Some(logo_url) = input.logo_url {
            active.logo_url = Set(Some(logo_url));
        }
        if let Some(license) = input.environmental_license {
            active.environmental_license = Set(Some(license));
        }
        if let Some(permit) = input.sanitary_permit {
            active.sanitary_permit = Set(Some(permit));
        }
        active.updated_at = Set(Utc::now());

        let saved = active.update(&*self.db).await?;
        self.event_sender.send(Event::CompanyUpdated(saved.id)).await;
        Ok(saved)
    }

    /// Removes a company together with its service orders and their stored
    /// reports, in one transaction.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.get(id).await?;

        let txn = self.db.begin().await?;
        let order_numbers: Vec<String> = service_order::Entity::find()
            .filter(service_order::Column::CompanyId.eq(id))
            .select_only()
            .column(service_order::Column::OrderNumber)
            .into_tuple()
            .all(&txn)
            .await?;
        if !order_numbers.is_empty() {
            report_document::Entity::delete_many()
                .filter(report_document::Column::OrderNumber.is_in(order_numbers))
                .exec(&txn)
                .await?;
            service_order::Entity::delete_many()
                .filter(service_order::Column::CompanyId.eq(id))
                .exec(&txn)
                .await?;
        }
        company::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        self.event_sender.send(Event::CompanyDeleted(id)).await;
        Ok(())
    }
}

impl From<&company::Model> for CompanyProfile {
    fn from(model: &company::Model) -> Self {
        CompanyProfile {
            name: model.name.clone(),
            cnpj: Some(model.cnpj.clone()),
            phone: model.phone.clone(),
            address: model.address.clone(),
            email: model.email.clone(),
            logo_url: model.logo_url.clone(),
            environmental_license: model.environmental_license.clone(),
            sanitary_permit: model.sanitary_permit.clone(),
        }
    }
}
