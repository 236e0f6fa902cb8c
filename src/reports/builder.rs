use crate::models::{
    format_device_ranges, CompanyProfile, ServiceOrderReportData,
};

use super::blocks::{ReportBlock, SignatureSlot};

const NOT_INFORMED: &str = "Não informado";
const NOT_AVAILABLE: &str = "N/A";

fn text_or<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => v,
        _ => fallback,
    }
}

/// Assembles the block list for one report, in the fixed section order:
/// header, licenses, client, services, products, devices, pest counts,
/// observations, signatures. Empty sections are skipped entirely.
pub fn build_blocks(company: &CompanyProfile, data: &ServiceOrderReportData) -> Vec<ReportBlock> {
    let mut blocks = Vec::new();

    blocks.push(header_block(company, data));

    if company.environmental_license.is_some() || company.sanitary_permit.is_some() {
        blocks.push(ReportBlock::LicenseLine(format!(
            "Licença Ambiental: {}   Alvará Sanitário: {}",
            text_or(&company.environmental_license, NOT_AVAILABLE),
            text_or(&company.sanitary_permit, NOT_AVAILABLE),
        )));
    }

    blocks.push(client_block(data));

    if !data.services.is_empty() {
        blocks.push(ReportBlock::SectionTitle("Serviços".into()));
        blocks.push(ReportBlock::ServicesTable {
            rows: data
                .services
                .iter()
                .map(|s| {
                    [
                        s.service_type.clone(),
                        text_or(&s.target_pest, NOT_AVAILABLE).to_string(),
                        text_or(&s.location, NOT_AVAILABLE).to_string(),
                    ]
                })
                .collect(),
        });

        let product_rows: Vec<[String; 4]> = data
            .services
            .iter()
            .filter_map(|s| s.product.as_ref())
            .map(|p| {
                [
                    p.name.clone(),
                    text_or(&p.active_ingredient, NOT_AVAILABLE).to_string(),
                    text_or(&p.registration, NOT_AVAILABLE).to_string(),
                    format!(
                        "{} / {}",
                        text_or(&p.quantity, NOT_AVAILABLE),
                        text_or(&p.dilution, NOT_AVAILABLE)
                    ),
                ]
            })
            .collect();
        if !product_rows.is_empty() {
            blocks.push(ReportBlock::SectionTitle("Produtos Utilizados".into()));
            blocks.push(ReportBlock::ProductsTable { rows: product_rows });
        }
    }

    if !data.device_groups.is_empty() {
        let rows: Vec<[String; 4]> = data
            .device_groups
            .iter()
            .flat_map(|group| {
                group.statuses.iter().map(move |entry| {
                    [
                        group.device_type.clone(),
                        entry.status.to_string(),
                        entry.count.to_string(),
                        format_device_ranges(&entry.devices),
                    ]
                })
            })
            .collect();
        if !rows.is_empty() {
            blocks.push(ReportBlock::SectionTitle("Dispositivos".into()));
            blocks.push(ReportBlock::DeviceSummaryTable { rows });
        }
    }

    let pest_counts = data.renderable_pest_counts();
    if !pest_counts.is_empty() {
        blocks.push(ReportBlock::SectionTitle("Contagem de Pragas".into()));
        for pc in pest_counts {
            blocks.push(ReportBlock::PestDeviceTable {
                title: format!("{} - Dispositivo {}", pc.device_type, pc.device_number),
                rows: pc
                    .pests
                    .iter()
                    .filter(|p| p.count > 0)
                    .map(|p| (p.name.clone(), p.count))
                    .collect(),
            });
        }
    }

    if let Some(text) = data.observations.as_deref() {
        if !text.trim().is_empty() {
            blocks.push(ReportBlock::Observations {
                text: text.to_string(),
            });
        }
    }

    blocks.push(signature_block(data));

    blocks
}

fn header_block(company: &CompanyProfile, data: &ServiceOrderReportData) -> ReportBlock {
    let mut info_lines = Vec::new();
    info_lines.push(format!("CNPJ: {}", text_or(&company.cnpj, NOT_AVAILABLE)));
    if let Some(address) = company.address.as_deref().filter(|s| !s.trim().is_empty()) {
        info_lines.push(address.to_string());
    }
    let phone = text_or(&company.phone, NOT_AVAILABLE);
    let email = text_or(&company.email, NOT_AVAILABLE);
    info_lines.push(format!("Telefone: {}   Email: {}", phone, email));

    let times = match (data.start_time.as_deref(), data.end_time.as_deref()) {
        (Some(start), Some(end)) => format!("{} - {}", start, end),
        (Some(start), None) => start.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    };

    ReportBlock::Header {
        company_name: company.name.clone(),
        info_lines,
        order_line: format!("Ordem De Serviço Nº {}", data.order_number),
        date_line: format!(
            "Data: {}   Horário: {}",
            data.date.format("%d/%m/%Y"),
            times
        ),
    }
}

fn client_block(data: &ServiceOrderReportData) -> ReportBlock {
    ReportBlock::ClientInfo {
        rows: vec![
            ("Cliente".into(), data.client.name.clone()),
            (
                "Endereço".into(),
                text_or(&data.client.address, NOT_INFORMED).to_string(),
            ),
            (
                "Contato".into(),
                text_or(&data.client.contact, NOT_INFORMED).to_string(),
            ),
            (
                "CNPJ/CPF".into(),
                text_or(&data.client.tax_id, NOT_INFORMED).to_string(),
            ),
        ],
    }
}

fn signature_block(data: &ServiceOrderReportData) -> ReportBlock {
    let signatures = data.signatures.clone().unwrap_or_default();
    ReportBlock::SignatureRow {
        slots: vec![
            SignatureSlot {
                label: "Controlador De Pragas".into(),
                name: Some(
                    text_or(&data.technician_name, "Controlador").to_string(),
                ),
                image: signatures.controller,
            },
            SignatureSlot {
                label: "Responsável Técnico".into(),
                name: None,
                image: signatures.technical_manager,
            },
            SignatureSlot {
                label: "Contato Do Cliente".into(),
                name: data.client.contact.clone(),
                image: signatures.client_contact,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientRecord, DeviceGroup, DevicePestCount, DeviceStatus, PestTally, StatusCount};
    use chrono::NaiveDate;

    fn minimal_data() -> ServiceOrderReportData {
        ServiceOrderReportData {
            order_number: "000007".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            start_time: Some("08:30".into()),
            end_time: Some("10:00".into()),
            client: ClientRecord {
                name: "Mercado Bom Preço".into(),
                address: None,
                contact: None,
                tax_id: None,
            },
            technician_name: Some("João Silva".into()),
            services: vec![],
            device_groups: vec![],
            pest_counts: vec![],
            observations: None,
            signatures: None,
        }
    }

    #[test]
    fn zero_services_still_yields_header_and_client() {
        let company = CompanyProfile {
            name: "Dedetizadora Alfa".into(),
            ..Default::default()
        };
        let blocks = build_blocks(&company, &minimal_data());

        assert!(matches!(blocks[0], ReportBlock::Header { .. }));
        assert!(blocks.iter().any(|b| matches!(b, ReportBlock::ClientInfo { .. })));
        assert!(!blocks.iter().any(|b| matches!(b, ReportBlock::ServicesTable { .. })));
        // signatures always close the report
        assert!(matches!(blocks.last(), Some(ReportBlock::SignatureRow { .. })));
    }

    #[test]
    fn no_eligible_pest_counts_means_no_pest_section() {
        let company = CompanyProfile {
            name: "Dedetizadora Alfa".into(),
            ..Default::default()
        };
        let mut data = minimal_data();
        data.device_groups = vec![DeviceGroup {
            device_type: "Armadilha".into(),
            quantity: 4,
            statuses: vec![StatusCount {
                status: DeviceStatus::Conforme,
                count: 4,
                devices: vec![1, 2, 3, 4],
            }],
        }];
        // counted pests on a device that is not eligible
        data.pest_counts = vec![DevicePestCount {
            device_type: "Armadilha".into(),
            device_number: 1,
            pests: vec![PestTally {
                name: "Barata".into(),
                count: 2,
            }],
        }];

        let blocks = build_blocks(&company, &data);
        assert!(!blocks
            .iter()
            .any(|b| matches!(b, ReportBlock::PestDeviceTable { .. })));
    }

    #[test]
    fn missing_client_fields_become_placeholders() {
        let company = CompanyProfile {
            name: "Dedetizadora Alfa".into(),
            ..Default::default()
        };
        let blocks = build_blocks(&company, &minimal_data());

        let rows = blocks
            .iter()
            .find_map(|b| match b {
                ReportBlock::ClientInfo { rows } => Some(rows),
                _ => None,
            })
            .unwrap();
        assert_eq!(rows[1].1, "Não informado");
        assert_eq!(rows[2].1, "Não informado");
    }

    #[test]
    fn sections_keep_fixed_order() {
        let company = CompanyProfile {
            name: "Dedetizadora Alfa".into(),
            environmental_license: Some("LA-123".into()),
            ..Default::default()
        };
        let mut data = minimal_data();
        data.observations = Some("Área externa revisada.".into());
        data.device_groups = vec![DeviceGroup {
            device_type: "Armadilha".into(),
            quantity: 2,
            statuses: vec![StatusCount {
                status: DeviceStatus::PragaEncontrada,
                count: 1,
                devices: vec![2],
            }],
        }];
        data.pest_counts = vec![DevicePestCount {
            device_type: "Armadilha".into(),
            device_number: 2,
            pests: vec![PestTally {
                name: "Rato".into(),
                count: 1,
            }],
        }];

        let blocks = build_blocks(&company, &data);
        let position = |pred: fn(&ReportBlock) -> bool| blocks.iter().position(pred).unwrap();

        let header = position(|b| matches!(b, ReportBlock::Header { .. }));
        let license = position(|b| matches!(b, ReportBlock::LicenseLine(_)));
        let client = position(|b| matches!(b, ReportBlock::ClientInfo { .. }));
        let devices = position(|b| matches!(b, ReportBlock::DeviceSummaryTable { .. }));
        let pests = position(|b| matches!(b, ReportBlock::PestDeviceTable { .. }));
        let observations = position(|b| matches!(b, ReportBlock::Observations { .. }));
        let signatures = position(|b| matches!(b, ReportBlock::SignatureRow { .. }));

        assert!(header < license);
        assert!(license < client);
        assert!(client < devices);
        assert!(devices < pests);
        assert!(pests < observations);
        assert!(observations < signatures);
    }
}
