use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::device::{DeviceGroup, DevicePestCount};

/// Client block of the report header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

/// Product applied during a service, when any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductApplication {
    pub name: String,
    #[serde(default)]
    pub active_ingredient: Option<String>,
    #[serde(default)]
    pub registration: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub dilution: Option<String>,
}

/// One service performed during the visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub service_type: String,
    #[serde(default)]
    pub target_pest: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub product: Option<ProductApplication>,
}

/// Captured signature images, base64-encoded PNG payloads
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Signatures {
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(default)]
    pub technical_manager: Option<String>,
    #[serde(default)]
    pub client_contact: Option<String>,
}

/// Company profile fields the report header draws from. Everything except
/// the name is optional; the builder substitutes placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub name: String,
    #[serde(default)]
    pub cnpj: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub environmental_license: Option<String>,
    #[serde(default)]
    pub sanitary_permit: Option<String>,
}

/// The immutable input of one report-generation run. Constructed fresh per
/// "finish order" action and discarded once the PDF bytes are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrderReportData {
    pub order_number: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub client: ClientRecord,
    #[serde(default)]
    pub technician_name: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub device_groups: Vec<DeviceGroup>,
    #[serde(default)]
    pub pest_counts: Vec<DevicePestCount>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub signatures: Option<Signatures>,
}

impl ServiceOrderReportData {
    /// Pest counts that actually render: eligible devices with at least one
    /// counted pest, in input order.
    pub fn renderable_pest_counts(&self) -> Vec<&DevicePestCount> {
        self.pest_counts
            .iter()
            .filter(|pc| pc.has_counts() && self.device_is_eligible(pc))
            .collect()
    }

    fn device_is_eligible(&self, pc: &DevicePestCount) -> bool {
        self.device_groups
            .iter()
            .filter(|g| g.device_type == pc.device_type)
            .flat_map(|g| g.statuses.iter())
            .any(|s| {
                s.status.eligible_for_pest_count() && s.devices.contains(&pc.device_number)
            })
    }
}
