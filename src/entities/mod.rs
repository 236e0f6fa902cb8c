pub mod company;
pub mod counter;
pub mod report_document;
pub mod service_order;
