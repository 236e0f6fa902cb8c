use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One field visit: services performed, devices inspected, pest counts.
///
/// The JSON columns hold the typed lists from `crate::models`; they are
/// validated on the way in and deserialized again before rendering.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub company_id: Uuid,
    pub client_name: String,
    pub client_address: Option<String>,
    pub client_contact: Option<String>,
    pub client_tax_id: Option<String>,
    pub scheduled_date: Date,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub technician_name: Option<String>,
    pub status: String,
    pub services: Json,
    pub device_groups: Json,
    pub pest_counts: Json,
    pub observations: Option<String>,
    pub signatures: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id"
    )]
    Company,
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle states of a service order
pub mod status {
    pub const SCHEDULED: &str = "scheduled";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const FINISHED: &str = "finished";
}
