use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored PDF artifact, keyed by order number, with the metadata used for
/// listing and download.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "report_documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub file_name: String,
    pub client_name: String,
    pub service_type: Option<String>,
    pub technician_name: Option<String>,
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Blob")]
    pub content: Vec<u8>,
    pub page_count: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
