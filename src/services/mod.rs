pub mod billing;
pub mod companies;
pub mod orders;
pub mod reports;

pub use billing::BillingService;
pub use companies::CompanyService;
pub use orders::OrderService;
pub use reports::ReportService;
