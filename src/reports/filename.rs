use chrono::NaiveDate;

/// Strips everything outside `[A-Za-z0-9 -]` so the name is safe on every
/// filesystem the artifact may land on.
fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Deterministic artifact name:
/// `"{ClientName} - {OrderNumber} - {DD-MM-YYYY} - {TechnicianName}.pdf"`.
pub fn report_file_name(
    client_name: &str,
    order_number: &str,
    date: NaiveDate,
    technician_name: Option<&str>,
) -> String {
    let client = {
        let s = sanitize(client_name);
        if s.is_empty() {
            "Cliente".to_string()
        } else {
            s
        }
    };
    let technician = match technician_name.map(sanitize) {
        Some(s) if !s.is_empty() => s,
        _ => "Controlador".to_string(),
    };

    format!(
        "{} - {} - {} - {}.pdf",
        client,
        order_number,
        date.format("%d-%m-%Y"),
        technician
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
    }

    #[test]
    fn builds_expected_name() {
        assert_eq!(
            report_file_name("Padaria Central", "000042", date(), Some("Joao Silva")),
            "Padaria Central - 000042 - 05-03-2026 - Joao Silva.pdf"
        );
    }

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(
            report_file_name("Água & Cia. Ltda/ME", "000001", date(), Some("José")),
            "gua  Cia LtdaME - 000001 - 05-03-2026 - Jos.pdf"
        );
    }

    #[test]
    fn falls_back_when_names_are_empty() {
        assert_eq!(
            report_file_name("", "000002", date(), None),
            "Cliente - 000002 - 05-03-2026 - Controlador.pdf"
        );
        assert_eq!(
            report_file_name("!!!", "000003", date(), Some("???")),
            "Cliente - 000003 - 05-03-2026 - Controlador.pdf"
        );
    }

    #[test]
    fn same_inputs_same_name() {
        let a = report_file_name("Cliente X", "000009", date(), Some("Tec"));
        let b = report_file_name("Cliente X", "000009", date(), Some("Tec"));
        assert_eq!(a, b);
    }
}
