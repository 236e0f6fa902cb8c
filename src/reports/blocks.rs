/// One indivisible unit of report content. A block is never split across a
/// page boundary; the layout pass decides only where breaks go between them.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportBlock {
    /// Company identification, order number and visit date/times
    Header {
        company_name: String,
        info_lines: Vec<String>,
        order_line: String,
        date_line: String,
    },
    /// Environmental license / sanitary permit line
    LicenseLine(String),
    /// Label/value rows describing the client
    ClientInfo { rows: Vec<(String, String)> },
    SectionTitle(String),
    /// Service type, target pest, location
    ServicesTable { rows: Vec<[String; 3]> },
    /// Product, active ingredient, registration, quantity/dilution
    ProductsTable { rows: Vec<[String; 4]> },
    /// Device type, status, count, device ranges
    DeviceSummaryTable { rows: Vec<[String; 4]> },
    /// Per-device pest tallies. The only block with render variants:
    /// the column header repeats at page starts and a compact row metric
    /// is tried before forcing a break.
    PestDeviceTable {
        title: String,
        rows: Vec<(String, u32)>,
    },
    Observations { text: String },
    /// Signature slots rendered side by side, fixed height
    SignatureRow { slots: Vec<SignatureSlot> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureSlot {
    pub label: String,
    pub name: Option<String>,
    /// base64 PNG payload captured in the field, if any
    pub image: Option<String>,
}

impl ReportBlock {
    /// Pest tables get the compact-retry and header-repeat treatment
    pub fn is_pest_table(&self) -> bool {
        matches!(self, ReportBlock::PestDeviceTable { .. })
    }

    /// Trailing sections measured against the page remainder with the
    /// larger whitespace minimum
    pub fn is_trailing_section(&self) -> bool {
        matches!(
            self,
            ReportBlock::Observations { .. } | ReportBlock::SignatureRow { .. }
        )
    }
}
