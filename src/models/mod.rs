pub mod device;
pub mod report;

pub use device::{
    format_device_ranges, reconcile_group, DevicePestCount, DeviceGroup, DeviceStatus, PestTally,
    ReconcileError, StatusCount,
};
pub use report::{
    ClientRecord, CompanyProfile, ProductApplication, ServiceEntry, ServiceOrderReportData,
    Signatures,
};
