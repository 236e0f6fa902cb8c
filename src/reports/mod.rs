//! Service-order report pipeline: typed blocks, deterministic measurement,
//! pagination, PDF rasterization and artifact naming.

pub mod blocks;
pub mod builder;
pub mod filename;
pub mod layout;
pub mod measure;
pub mod render;

pub use blocks::ReportBlock;
pub use builder::build_blocks;
pub use filename::report_file_name;
pub use layout::{LayoutEngine, LayoutPlan, PlacedBlock};
pub use measure::{BlockMeasurer, FixedMetrics, MeasureError, PageGeometry, RenderVariant};
pub use render::render_pdf;
