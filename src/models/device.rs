use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

/// Inspection status of a monitoring device. The serialized names are the
/// field labels technicians see and are kept verbatim on the wire and in the
/// rendered report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    ToSchema,
)]
pub enum DeviceStatus {
    #[serde(rename = "Conforme")]
    #[strum(serialize = "Conforme")]
    Conforme,
    #[serde(rename = "Sem Dispositivo")]
    #[strum(serialize = "Sem Dispositivo")]
    SemDispositivo,
    #[serde(rename = "Dispositivo danificado")]
    #[strum(serialize = "Dispositivo danificado")]
    DispositivoDanificado,
    #[serde(rename = "Consumida")]
    #[strum(serialize = "Consumida")]
    Consumida,
    #[serde(rename = "Sem acesso")]
    #[strum(serialize = "Sem acesso")]
    SemAcesso,
    #[serde(rename = "Desarmada")]
    #[strum(serialize = "Desarmada")]
    Desarmada,
    #[serde(rename = "Desligada")]
    #[strum(serialize = "Desligada")]
    Desligada,
    #[serde(rename = "Praga encontrada")]
    #[strum(serialize = "Praga encontrada")]
    PragaEncontrada,
    #[serde(rename = "Refil substituído")]
    #[strum(serialize = "Refil substituído")]
    RefilSubstituido,
    #[serde(rename = "Atrativo biológico substituído")]
    #[strum(serialize = "Atrativo biológico substituído")]
    AtrativoBiologicoSubstituido,
    #[serde(rename = "inativo")]
    #[strum(serialize = "inativo")]
    Inativo,
}

impl DeviceStatus {
    /// Whether a device with this status takes part in pest counting:
    /// refill/bait replacement or a found pest, never an inactive device.
    pub fn eligible_for_pest_count(&self) -> bool {
        matches!(
            self,
            Self::RefilSubstituido | Self::AtrativoBiologicoSubstituido | Self::PragaEncontrada
        )
    }
}

/// Per-status breakdown inside a device group. `count` defaults to the
/// length of `devices` when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCount {
    #[serde(rename = "name")]
    pub status: DeviceStatus,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub devices: Vec<u32>,
}

/// Devices of one type, numbered `1..=quantity`, with a per-status breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceGroup {
    pub device_type: String,
    pub quantity: u32,
    #[serde(default)]
    pub statuses: Vec<StatusCount>,
}

/// One pest tally row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PestTally {
    pub name: String,
    pub count: u32,
}

/// One device's per-pest tallies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevicePestCount {
    pub device_type: String,
    pub device_number: u32,
    #[serde(default)]
    pub pests: Vec<PestTally>,
}

impl DevicePestCount {
    /// Devices with no counted pests are skipped by the report
    pub fn has_counts(&self) -> bool {
        self.pests.iter().any(|p| p.count > 0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("device number {number} is outside 1..={quantity} for group '{device_type}'")]
    DeviceNumberOutOfRange {
        device_type: String,
        number: u32,
        quantity: u32,
    },
    #[error("non-compliant counts ({counted}) exceed group quantity {quantity} for '{device_type}'")]
    CountExceedsQuantity {
        device_type: String,
        counted: u32,
        quantity: u32,
    },
}

/// Rebuilds the "Conforme" entry of a group from its non-compliant entries.
///
/// Guarantees, for the returned group:
/// `sum(count for status != Conforme) + Conforme.count == quantity`, and
/// `Conforme.devices` is the complement of all non-Conforme device numbers
/// within `1..=quantity`. Any caller-supplied Conforme entry is discarded.
pub fn reconcile_group(group: &DeviceGroup) -> Result<DeviceGroup, ReconcileError> {
    let mut non_compliant: Vec<StatusCount> = Vec::new();
    let mut taken: BTreeSet<u32> = BTreeSet::new();
    let mut counted: u32 = 0;

    for entry in &group.statuses {
        if entry.status == DeviceStatus::Conforme {
            continue;
        }
        for &number in &entry.devices {
            if number == 0 || number > group.quantity {
                return Err(ReconcileError::DeviceNumberOutOfRange {
                    device_type: group.device_type.clone(),
                    number,
                    quantity: group.quantity,
                });
            }
            taken.insert(number);
        }
        let count = if entry.devices.is_empty() {
            entry.count
        } else {
            entry.devices.len() as u32
        };
        counted += count;
        non_compliant.push(StatusCount {
            status: entry.status,
            count,
            devices: entry.devices.clone(),
        });
    }

    if counted > group.quantity {
        return Err(ReconcileError::CountExceedsQuantity {
            device_type: group.device_type.clone(),
            counted,
            quantity: group.quantity,
        });
    }

    let compliant_devices: Vec<u32> = (1..=group.quantity)
        .filter(|n| !taken.contains(n))
        .collect();

    let mut statuses = Vec::with_capacity(non_compliant.len() + 1);
    statuses.push(StatusCount {
        status: DeviceStatus::Conforme,
        count: group.quantity - counted,
        devices: compliant_devices,
    });
    statuses.extend(non_compliant);

    Ok(DeviceGroup {
        device_type: group.device_type.clone(),
        quantity: group.quantity,
        statuses,
    })
}

/// Compresses sorted device numbers into display ranges: `[1,2,3,4,5,8]`
/// becomes `"1-5, 8"`.
pub fn format_device_ranges(numbers: &[u32]) -> String {
    let sorted: BTreeSet<u32> = numbers.iter().copied().collect();
    let mut parts: Vec<String> = Vec::new();
    let mut run: Option<(u32, u32)> = None;

    for n in sorted {
        run = match run {
            Some((start, end)) if n == end + 1 => Some((start, n)),
            Some((start, end)) => {
                parts.push(format_run(start, end));
                Some((n, n))
            }
            None => Some((n, n)),
        };
    }
    if let Some((start, end)) = run {
        parts.push(format_run(start, end));
    }

    parts.join(", ")
}

fn format_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(quantity: u32, statuses: Vec<StatusCount>) -> DeviceGroup {
        DeviceGroup {
            device_type: "Armadilha".into(),
            quantity,
            statuses,
        }
    }

    #[test]
    fn reconcile_builds_complement() {
        // Armadilha x10 with pests found at devices 3 and 7
        let input = group(
            10,
            vec![StatusCount {
                status: DeviceStatus::PragaEncontrada,
                count: 0,
                devices: vec![3, 7],
            }],
        );

        let reconciled = reconcile_group(&input).unwrap();
        let conforme = &reconciled.statuses[0];
        assert_eq!(conforme.status, DeviceStatus::Conforme);
        assert_eq!(conforme.count, 8);
        assert_eq!(conforme.devices, vec![1, 2, 4, 5, 6, 8, 9, 10]);
        assert_eq!(reconciled.statuses[1].count, 2);
    }

    #[test]
    fn reconcile_sum_invariant_holds() {
        let input = group(
            12,
            vec![
                StatusCount {
                    status: DeviceStatus::Consumida,
                    count: 0,
                    devices: vec![1, 2, 5],
                },
                StatusCount {
                    status: DeviceStatus::SemAcesso,
                    count: 0,
                    devices: vec![9],
                },
            ],
        );

        let reconciled = reconcile_group(&input).unwrap();
        let total: u32 = reconciled.statuses.iter().map(|s| s.count).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn reconcile_discards_caller_conforme_entry() {
        let input = group(
            5,
            vec![
                StatusCount {
                    status: DeviceStatus::Conforme,
                    count: 99,
                    devices: vec![1, 2, 3, 4, 5],
                },
                StatusCount {
                    status: DeviceStatus::Desarmada,
                    count: 0,
                    devices: vec![2],
                },
            ],
        );

        let reconciled = reconcile_group(&input).unwrap();
        assert_eq!(reconciled.statuses[0].count, 4);
        assert_eq!(reconciled.statuses[0].devices, vec![1, 3, 4, 5]);
    }

    #[test]
    fn reconcile_rejects_out_of_range_device() {
        let input = group(
            4,
            vec![StatusCount {
                status: DeviceStatus::Consumida,
                count: 0,
                devices: vec![5],
            }],
        );
        assert!(matches!(
            reconcile_group(&input),
            Err(ReconcileError::DeviceNumberOutOfRange { number: 5, .. })
        ));
    }

    #[test]
    fn eligibility_rules() {
        assert!(DeviceStatus::PragaEncontrada.eligible_for_pest_count());
        assert!(DeviceStatus::RefilSubstituido.eligible_for_pest_count());
        assert!(DeviceStatus::AtrativoBiologicoSubstituido.eligible_for_pest_count());
        assert!(!DeviceStatus::Inativo.eligible_for_pest_count());
        assert!(!DeviceStatus::Conforme.eligible_for_pest_count());
    }

    #[test]
    fn device_ranges_compress_runs() {
        assert_eq!(format_device_ranges(&[1, 2, 3, 4, 5, 8]), "1-5, 8");
        assert_eq!(format_device_ranges(&[8, 1, 3, 2]), "1-3, 8");
        assert_eq!(format_device_ranges(&[4]), "4");
        assert_eq!(format_device_ranges(&[]), "");
    }

    #[test]
    fn status_serializes_with_display_labels() {
        let json = serde_json::to_string(&DeviceStatus::PragaEncontrada).unwrap();
        assert_eq!(json, "\"Praga encontrada\"");
        let back: DeviceStatus = serde_json::from_str("\"Refil substituído\"").unwrap();
        assert_eq!(back, DeviceStatus::RefilSubstituido);
    }
}
