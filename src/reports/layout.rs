use tracing::warn;

use super::blocks::ReportBlock;
use super::measure::{BlockMeasurer, PageGeometry, RenderVariant};

/// One block with its decided page position and render variant
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBlock {
    /// Index into the block list given to `paginate`
    pub index: usize,
    /// Zero-based page
    pub page: usize,
    /// True when this block starts a fresh page
    pub break_before: bool,
    pub variant: RenderVariant,
    /// Offset from the top of the page content area, px
    pub y_offset_px: f64,
    /// Accounted height, px
    pub height_px: f64,
}

/// The output of one pagination pass
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub placements: Vec<PlacedBlock>,
    pub page_count: usize,
}

impl LayoutPlan {
    /// Positions of the emitted page-break markers, as block indices that
    /// start a fresh page. Identical inputs must yield identical sequences.
    pub fn break_positions(&self) -> Vec<usize> {
        self.placements
            .iter()
            .filter(|p| p.break_before)
            .map(|p| p.index)
            .collect()
    }
}

/// Decides where page breaks go so that no block is ever split across two
/// pages, packing as densely as the geometry allows.
pub struct LayoutEngine<'a, M: BlockMeasurer> {
    geometry: PageGeometry,
    measurer: &'a M,
}

impl<'a, M: BlockMeasurer> LayoutEngine<'a, M> {
    pub fn new(geometry: PageGeometry, measurer: &'a M) -> Self {
        Self { geometry, measurer }
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn paginate(&self, blocks: &[ReportBlock]) -> LayoutPlan {
        let usable = self.geometry.usable_height();
        let mut placements = Vec::with_capacity(blocks.len());
        let mut page = 0usize;
        let mut accumulated = 0.0f64;
        // Pest tables repeat their column header at every page start; within
        // a page the header appears once, on the first pest table placed.
        let mut pest_header_on_page = false;

        for (index, block) in blocks.iter().enumerate() {
            let placed = if block.is_pest_table() {
                self.place_pest_table(
                    index,
                    block,
                    &mut page,
                    &mut accumulated,
                    &mut pest_header_on_page,
                )
            } else {
                let min_ws = if block.is_trailing_section() {
                    self.geometry.section_min_whitespace_px
                } else {
                    0.0
                };
                self.place_plain(index, block, min_ws, &mut page, &mut accumulated, &mut pest_header_on_page)
            };
            placements.push(placed);
        }

        let page_count = if placements.is_empty() { 1 } else { page + 1 };
        // A block taller than a whole page still starts at a page top; it
        // cannot be split, so it is allowed to overflow there.
        debug_assert!(placements.iter().all(|p| {
            p.break_before
                || p.y_offset_px == 0.0
                || p.y_offset_px + p.height_px <= usable + f64::EPSILON
        }));

        LayoutPlan {
            placements,
            page_count,
        }
    }

    /// Fit test: the block plus its trailing margin must stay above the
    /// pagination reserve, and leave at least `min_ws` of whitespace.
    fn fits(&self, accumulated: f64, height: f64, min_ws: f64) -> bool {
        let usable = self.geometry.usable_height();
        accumulated + height + self.geometry.table_bottom_margin_px
            <= usable - self.geometry.pagination_reserve_px
            && usable - (accumulated + height) >= min_ws
    }

    fn place_pest_table(
        &self,
        index: usize,
        block: &ReportBlock,
        page: &mut usize,
        accumulated: &mut f64,
        pest_header_on_page: &mut bool,
    ) -> PlacedBlock {
        let min_ws = self.geometry.min_bottom_whitespace_px;
        let full = RenderVariant {
            compact: false,
            with_header: !*pest_header_on_page,
        };

        let height = match self.measurer.measure(block, full) {
            Ok(h) => h,
            Err(e) => {
                warn!(block = index, error = %e, "block measurement failed; placing without forced break");
                return self.place_unmeasured(index, *page, accumulated, full);
            }
        };

        if self.fits(*accumulated, height, min_ws) {
            return self.commit(index, *page, false, full, height, accumulated, pest_header_on_page);
        }

        // Retry once with the compact variant before forcing a break; the
        // compact squeeze accepts a smaller leftover than the full table
        let compact = RenderVariant {
            compact: true,
            with_header: full.with_header,
        };
        if let Ok(compact_height) = self.measurer.measure(block, compact) {
            if self.fits(
                *accumulated,
                compact_height,
                self.geometry.compact_min_whitespace_px,
            ) {
                return self.commit(
                    index,
                    *page,
                    false,
                    compact,
                    compact_height,
                    accumulated,
                    pest_header_on_page,
                );
            }
        }

        // Fresh page: reset accounting and re-measure with the header
        // included, since the block now starts the page.
        *page += 1;
        *accumulated = 0.0;
        *pest_header_on_page = false;
        let restart = RenderVariant {
            compact: false,
            with_header: true,
        };
        let restart_height = match self.measurer.measure(block, restart) {
            Ok(h) => h,
            Err(e) => {
                warn!(block = index, error = %e, "block re-measurement failed after break");
                return self.place_unmeasured(index, *page, accumulated, restart);
            }
        };
        self.commit(
            index,
            *page,
            true,
            restart,
            restart_height,
            accumulated,
            pest_header_on_page,
        )
    }

    fn place_plain(
        &self,
        index: usize,
        block: &ReportBlock,
        min_ws: f64,
        page: &mut usize,
        accumulated: &mut f64,
        pest_header_on_page: &mut bool,
    ) -> PlacedBlock {
        let variant = RenderVariant::default();
        let height = match self.measurer.measure(block, variant) {
            Ok(h) => h,
            Err(e) => {
                warn!(block = index, error = %e, "block measurement failed; placing without forced break");
                return self.place_unmeasured(index, *page, accumulated, variant);
            }
        };

        if *accumulated > 0.0 && !self.fits(*accumulated, height, min_ws) {
            *page += 1;
            *accumulated = 0.0;
            *pest_header_on_page = false;
            return self.commit(index, *page, true, variant, height, accumulated, pest_header_on_page);
        }

        self.commit(index, *page, false, variant, height, accumulated, pest_header_on_page)
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        index: usize,
        page: usize,
        break_before: bool,
        variant: RenderVariant,
        height: f64,
        accumulated: &mut f64,
        pest_header_on_page: &mut bool,
    ) -> PlacedBlock {
        let y_offset = *accumulated;
        // Accumulate the actual height of the chosen variant, not the first
        // estimate, so rounding never compounds across many devices.
        *accumulated += height + self.geometry.table_bottom_margin_px;
        if variant.with_header {
            *pest_header_on_page = true;
        }
        PlacedBlock {
            index,
            page,
            break_before,
            variant,
            y_offset_px: y_offset,
            height_px: height,
        }
    }

    /// Best-effort placement when measurement fails: no forced break, zero
    /// accounted height. May visually overflow; logged, not fatal.
    fn place_unmeasured(
        &self,
        index: usize,
        page: usize,
        accumulated: &mut f64,
        variant: RenderVariant,
    ) -> PlacedBlock {
        PlacedBlock {
            index,
            page,
            break_before: false,
            variant,
            y_offset_px: *accumulated,
            height_px: 0.0,
        }
    }
}
