use super::blocks::ReportBlock;

/// Fixed page geometry, in pixels at the 96 dpi reference the original
/// report layout was tuned against (A4: 794x1122).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width_px: f64,
    pub page_height_px: f64,
    /// Combined top+bottom margins
    pub vertical_margins_px: f64,
    /// Reserved footer allowance for the page-number stamp
    pub pagination_reserve_px: f64,
    /// Minimum leftover whitespace below a pest table
    pub min_bottom_whitespace_px: f64,
    /// Looser leftover minimum accepted when the compact variant is used to
    /// squeeze a pest table onto the current page
    pub compact_min_whitespace_px: f64,
    /// Minimum leftover whitespace below observations/signatures
    pub section_min_whitespace_px: f64,
    /// Gap appended after each table block
    pub table_bottom_margin_px: f64,
    /// Horizontal margin on each side
    pub side_margin_px: f64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            page_width_px: 794.0,
            page_height_px: 1122.0,
            vertical_margins_px: 114.0,
            pagination_reserve_px: 8.0,
            min_bottom_whitespace_px: 8.0,
            compact_min_whitespace_px: 6.0,
            section_min_whitespace_px: 10.0,
            table_bottom_margin_px: 4.0,
            side_margin_px: 48.0,
        }
    }
}

impl PageGeometry {
    /// Content height available per page
    pub fn usable_height(&self) -> f64 {
        self.page_height_px - self.vertical_margins_px
    }

    /// Content width available per line
    pub fn usable_width(&self) -> f64 {
        self.page_width_px - 2.0 * self.side_margin_px
    }
}

/// How a block is rendered for one measurement/placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderVariant {
    pub compact: bool,
    pub with_header: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error("block could not be measured: {0}")]
    Unmeasurable(String),
}

/// Computes the rendered height of a block for a given variant. The layout
/// pass and the PDF renderer share one implementation so the accounted
/// heights match what is drawn.
pub trait BlockMeasurer {
    fn measure(&self, block: &ReportBlock, variant: RenderVariant) -> Result<f64, MeasureError>;
}

/// Deterministic character-metric measurer. No rendering engine involved:
/// heights come from fixed row metrics and a fixed-width line-wrap estimate.
#[derive(Debug, Clone, Copy)]
pub struct FixedMetrics {
    geometry: PageGeometry,
}

/// Row metrics, px. Shared with the renderer so drawn content stays inside
/// the accounted heights.
pub(crate) const TITLE_HEIGHT: f64 = 28.0;
pub(crate) const TABLE_HEADER_HEIGHT: f64 = 26.0;
pub(crate) const TABLE_HEADER_HEIGHT_COMPACT: f64 = 20.0;
pub(crate) const TABLE_ROW_HEIGHT: f64 = 24.0;
pub(crate) const TABLE_ROW_HEIGHT_COMPACT: f64 = 18.0;
pub(crate) const PEST_TABLE_TITLE_HEIGHT: f64 = 20.0;
pub(crate) const CLIENT_ROW_HEIGHT: f64 = 20.0;
pub(crate) const TEXT_LINE_HEIGHT: f64 = 18.0;
pub(crate) const HEADER_NAME_HEIGHT: f64 = 30.0;
pub(crate) const HEADER_LINE_HEIGHT: f64 = 16.0;
pub(crate) const SIGNATURE_ROW_HEIGHT: f64 = 110.0;
const CHAR_WIDTH_PX: f64 = 7.2;

impl FixedMetrics {
    pub fn new(geometry: PageGeometry) -> Self {
        Self { geometry }
    }

    fn wrapped_lines(&self, text: &str) -> usize {
        wrap_text(text, self.max_chars_per_line()).len().max(1)
    }

    pub(crate) fn max_chars_per_line(&self) -> usize {
        (self.geometry.usable_width() / CHAR_WIDTH_PX) as usize
    }
}

impl BlockMeasurer for FixedMetrics {
    fn measure(&self, block: &ReportBlock, variant: RenderVariant) -> Result<f64, MeasureError> {
        let height = match block {
            ReportBlock::Header { info_lines, .. } => {
                // name + info lines + order and date lines + padding
                HEADER_NAME_HEIGHT + (info_lines.len() as f64 + 2.0) * HEADER_LINE_HEIGHT + 8.0
            }
            ReportBlock::LicenseLine(_) => TEXT_LINE_HEIGHT,
            ReportBlock::ClientInfo { rows } => 12.0 + rows.len() as f64 * CLIENT_ROW_HEIGHT,
            ReportBlock::SectionTitle(_) => TITLE_HEIGHT,
            ReportBlock::ServicesTable { rows } => {
                TABLE_HEADER_HEIGHT + rows.len() as f64 * TABLE_ROW_HEIGHT
            }
            ReportBlock::ProductsTable { rows } => {
                TABLE_HEADER_HEIGHT + rows.len() as f64 * TABLE_ROW_HEIGHT
            }
            ReportBlock::DeviceSummaryTable { rows } => {
                TABLE_HEADER_HEIGHT + rows.len() as f64 * TABLE_ROW_HEIGHT
            }
            ReportBlock::PestDeviceTable { rows, .. } => {
                let (header_h, row_h) = if variant.compact {
                    (TABLE_HEADER_HEIGHT_COMPACT, TABLE_ROW_HEIGHT_COMPACT)
                } else {
                    (TABLE_HEADER_HEIGHT, TABLE_ROW_HEIGHT)
                };
                let header = if variant.with_header { header_h } else { 0.0 };
                PEST_TABLE_TITLE_HEIGHT + header + rows.len() as f64 * row_h
            }
            ReportBlock::Observations { text } => {
                TITLE_HEIGHT + self.wrapped_lines(text) as f64 * TEXT_LINE_HEIGHT
            }
            ReportBlock::SignatureRow { .. } => SIGNATURE_ROW_HEIGHT,
        };
        Ok(height)
    }
}

/// Greedy word wrap at a fixed column budget. Shared by measurement and
/// rendering so both see the same line count.
pub(crate) fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for raw_line in text.lines() {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
            // A single word longer than the budget is hard-split
            while current.chars().count() > max_chars {
                let head: String = current.chars().take(max_chars).collect();
                let tail: String = current.chars().skip(max_chars).collect();
                lines.push(head);
                current = tail;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_defaults_match_reference_page() {
        let g = PageGeometry::default();
        assert_eq!(g.usable_height(), 1008.0);
        assert_eq!(g.page_width_px, 794.0);
    }

    #[test]
    fn pest_table_variants_shrink_height() {
        let m = FixedMetrics::new(PageGeometry::default());
        let block = ReportBlock::PestDeviceTable {
            title: "Armadilha - Dispositivo 3".into(),
            rows: vec![("Barata".into(), 4), ("Formiga".into(), 2)],
        };

        let full = m
            .measure(
                &block,
                RenderVariant {
                    compact: false,
                    with_header: true,
                },
            )
            .unwrap();
        let compact = m
            .measure(
                &block,
                RenderVariant {
                    compact: true,
                    with_header: true,
                },
            )
            .unwrap();
        let headerless = m
            .measure(
                &block,
                RenderVariant {
                    compact: false,
                    with_header: false,
                },
            )
            .unwrap();

        assert!(compact < full);
        assert!(headerless < full);
    }

    #[test]
    fn measurement_is_deterministic() {
        let m = FixedMetrics::new(PageGeometry::default());
        let block = ReportBlock::Observations {
            text: "Iscas renovadas em todos os pontos monitorados da área externa.".into(),
        };
        let a = m.measure(&block, RenderVariant::default()).unwrap();
        let b = m.measure(&block, RenderVariant::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrap_text_splits_on_budget() {
        let lines = wrap_text("um dois tres quatro", 8);
        assert_eq!(lines, vec!["um dois", "tres", "quatro"]);

        let long = wrap_text("abcdefghij", 4);
        assert_eq!(long, vec!["abcd", "efgh", "ij"]);

        assert_eq!(wrap_text("", 10), vec![String::new()]);
    }
}
