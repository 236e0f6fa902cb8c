use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Rgb,
};

use crate::errors::ServiceError;

use super::blocks::{ReportBlock, SignatureSlot};
use super::layout::LayoutPlan;
use super::measure::{self, wrap_text, FixedMetrics, PageGeometry};

const A4_WIDTH_MM: f64 = 210.0;
const A4_HEIGHT_MM: f64 = 297.0;

/// Rasterizes a layout plan into PDF bytes using the builtin Helvetica
/// faces. Coordinates are tracked in the layout's pixel space and converted
/// to millimetres at draw time.
pub fn render_pdf(
    title: &str,
    blocks: &[ReportBlock],
    plan: &LayoutPlan,
    geometry: &PageGeometry,
    metrics: &FixedMetrics,
) -> Result<Vec<u8>, ServiceError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(A4_WIDTH_MM as f32), Mm(A4_HEIGHT_MM as f32), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ServiceError::RenderError(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ServiceError::RenderError(e.to_string()))?;

    let mut layers: Vec<PdfLayerReference> = vec![doc.get_page(first_page).get_layer(first_layer)];
    for _ in 1..plan.page_count {
        let (page, layer) = doc.add_page(Mm(A4_WIDTH_MM as f32), Mm(A4_HEIGHT_MM as f32), "Layer 1");
        layers.push(doc.get_page(page).get_layer(layer));
    }

    let canvas = Canvas {
        geometry: *geometry,
        metrics: *metrics,
        regular,
        bold,
    };

    for placed in &plan.placements {
        let Some(block) = blocks.get(placed.index) else {
            continue;
        };
        let layer = &layers[placed.page.min(layers.len() - 1)];
        let top = geometry.vertical_margins_px / 2.0 + placed.y_offset_px;
        canvas.draw_block(layer, block, placed.variant.compact, placed.variant.with_header, top);
    }

    stamp_page_numbers(&canvas, &layers);

    doc.save_to_bytes()
        .map_err(|e| ServiceError::RenderError(e.to_string()))
}

/// Bottom-right "i/N" stamps, 8pt gray
fn stamp_page_numbers(canvas: &Canvas, layers: &[PdfLayerReference]) {
    let total = layers.len();
    for (i, layer) in layers.iter().enumerate() {
        let text = format!("{}/{}", i + 1, total);
        let x = canvas.geometry.page_width_px
            - canvas.geometry.side_margin_px
            - text.len() as f64 * 4.5;
        let y = canvas.geometry.page_height_px - canvas.geometry.vertical_margins_px / 4.0;
        layer.set_fill_color(Color::Rgb(Rgb::new(0.5, 0.5, 0.5, None)));
        layer.use_text(text, 8.0, canvas.x_mm(x), canvas.y_mm(y), &canvas.regular);
        layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
    }
}

struct Canvas {
    geometry: PageGeometry,
    metrics: FixedMetrics,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Canvas {
    fn x_mm(&self, x_px: f64) -> Mm {
        Mm((x_px * A4_WIDTH_MM / self.geometry.page_width_px) as f32)
    }

    /// Pixel offsets are measured from the page top; PDF space grows upward
    fn y_mm(&self, y_px: f64) -> Mm {
        Mm(((self.geometry.page_height_px - y_px) * A4_HEIGHT_MM / self.geometry.page_height_px) as f32)
    }

    fn text(&self, layer: &PdfLayerReference, text: &str, size: f32, x_px: f64, baseline_px: f64, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        layer.use_text(text, size, self.x_mm(x_px), self.y_mm(baseline_px), font);
    }

    fn rule(&self, layer: &PdfLayerReference, x1: f64, x2: f64, y_px: f64) {
        layer.set_outline_thickness(0.6);
        layer.set_outline_color(Color::Rgb(Rgb::new(0.2, 0.2, 0.2, None)));
        let line = Line {
            points: vec![
                (Point::new(self.x_mm(x1), self.y_mm(y_px)), false),
                (Point::new(self.x_mm(x2), self.y_mm(y_px)), false),
            ],
            is_closed: false,
        };
        layer.add_line(line);
    }

    fn draw_block(
        &self,
        layer: &PdfLayerReference,
        block: &ReportBlock,
        compact: bool,
        with_header: bool,
        top: f64,
    ) {
        let left = self.geometry.side_margin_px;
        let right = self.geometry.page_width_px - self.geometry.side_margin_px;
        let width = self.geometry.usable_width();

        match block {
            ReportBlock::Header {
                company_name,
                info_lines,
                order_line,
                date_line,
            } => {
                let mut y = top + measure::HEADER_NAME_HEIGHT - 8.0;
                self.text(layer, company_name, 14.0, left, y, true);
                y = top + measure::HEADER_NAME_HEIGHT;
                for line in info_lines {
                    y += measure::HEADER_LINE_HEIGHT;
                    self.text(layer, line, 9.0, left, y - 4.0, false);
                }
                y += measure::HEADER_LINE_HEIGHT;
                self.text(layer, order_line, 11.0, left, y - 4.0, true);
                y += measure::HEADER_LINE_HEIGHT;
                self.text(layer, date_line, 9.0, left, y - 4.0, false);
                self.rule(layer, left, right, y + 6.0);
            }
            ReportBlock::LicenseLine(text) => {
                self.text(layer, text, 9.0, left, top + measure::TEXT_LINE_HEIGHT - 4.0, false);
            }
            ReportBlock::ClientInfo { rows } => {
                let mut y = top + 12.0;
                for (label, value) in rows {
                    y += measure::CLIENT_ROW_HEIGHT;
                    self.text(layer, &format!("{}:", label), 10.0, left, y - 6.0, true);
                    self.text(layer, value, 10.0, left + width * 0.18, y - 6.0, false);
                }
            }
            ReportBlock::SectionTitle(title) => {
                let y = top + measure::TITLE_HEIGHT - 8.0;
                self.text(layer, title, 12.0, left, y, true);
                self.rule(layer, left, right, y + 4.0);
            }
            ReportBlock::ServicesTable { rows } => {
                self.table(
                    layer,
                    top,
                    &["Serviço", "Praga Alvo", "Local"],
                    &[0.0, 0.40, 0.70],
                    rows.iter().map(|r| r.to_vec()).collect(),
                );
            }
            ReportBlock::ProductsTable { rows } => {
                self.table(
                    layer,
                    top,
                    &["Produto", "Princípio Ativo", "Registro", "Qtde/Diluição"],
                    &[0.0, 0.30, 0.55, 0.80],
                    rows.iter().map(|r| r.to_vec()).collect(),
                );
            }
            ReportBlock::DeviceSummaryTable { rows } => {
                self.table(
                    layer,
                    top,
                    &["Dispositivo", "Status", "Qtde", "Números"],
                    &[0.0, 0.28, 0.58, 0.68],
                    rows.iter().map(|r| r.to_vec()).collect(),
                );
            }
            ReportBlock::PestDeviceTable { title, rows } => {
                let (header_h, row_h, size) = if compact {
                    (
                        measure::TABLE_HEADER_HEIGHT_COMPACT,
                        measure::TABLE_ROW_HEIGHT_COMPACT,
                        8.0,
                    )
                } else {
                    (measure::TABLE_HEADER_HEIGHT, measure::TABLE_ROW_HEIGHT, 9.0)
                };
                let mut y = top + measure::PEST_TABLE_TITLE_HEIGHT;
                self.text(layer, title, size + 1.0, left, y - 6.0, true);
                if with_header {
                    y += header_h;
                    self.text(layer, "Praga", size, left, y - 8.0, true);
                    self.text(layer, "Quantidade", size, left + width * 0.6, y - 8.0, true);
                    self.rule(layer, left, right, y - 4.0);
                }
                for (pest, count) in rows {
                    y += row_h;
                    self.text(layer, pest, size, left, y - 6.0, false);
                    self.text(layer, &count.to_string(), size, left + width * 0.6, y - 6.0, false);
                }
            }
            ReportBlock::Observations { text } => {
                let mut y = top + measure::TITLE_HEIGHT - 8.0;
                self.text(layer, "Observações", 12.0, left, y, true);
                y = top + measure::TITLE_HEIGHT;
                for line in wrap_text(text, self.metrics.max_chars_per_line()) {
                    y += measure::TEXT_LINE_HEIGHT;
                    self.text(layer, &line, 9.0, left, y - 5.0, false);
                }
            }
            ReportBlock::SignatureRow { slots } => {
                self.signature_row(layer, slots, top, left, width);
            }
        }
    }

    fn table(
        &self,
        layer: &PdfLayerReference,
        top: f64,
        headers: &[&str],
        offsets: &[f64],
        rows: Vec<Vec<String>>,
    ) {
        let left = self.geometry.side_margin_px;
        let right = self.geometry.page_width_px - self.geometry.side_margin_px;
        let width = self.geometry.usable_width();

        let mut y = top + measure::TABLE_HEADER_HEIGHT;
        for (header, offset) in headers.iter().zip(offsets) {
            self.text(layer, header, 9.0, left + width * offset, y - 8.0, true);
        }
        self.rule(layer, left, right, y - 4.0);

        for row in rows {
            y += measure::TABLE_ROW_HEIGHT;
            for (cell, offset) in row.iter().zip(offsets) {
                self.text(layer, cell, 9.0, left + width * offset, y - 7.0, false);
            }
        }
    }

    fn signature_row(
        &self,
        layer: &PdfLayerReference,
        slots: &[SignatureSlot],
        top: f64,
        left: f64,
        width: f64,
    ) {
        if slots.is_empty() {
            return;
        }
        let slot_width = width / slots.len() as f64;
        let line_y = top + measure::SIGNATURE_ROW_HEIGHT - 40.0;
        for (i, slot) in slots.iter().enumerate() {
            let x = left + slot_width * i as f64 + 10.0;
            let x_end = left + slot_width * (i as f64 + 1.0) - 10.0;
            self.rule(layer, x, x_end, line_y);
            self.text(layer, &slot.label, 8.0, x, line_y + 12.0, true);
            if let Some(name) = &slot.name {
                self.text(layer, name, 8.0, x, line_y + 24.0, false);
            }
        }
    }
}
