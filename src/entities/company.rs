use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Pest-control company profile; feeds the report header.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "companies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub cnpj: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
    pub environmental_license: Option<String>,
    pub sanitary_permit: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::service_order::Entity")]
    ServiceOrders,
}

impl Related<super::service_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ServiceOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
