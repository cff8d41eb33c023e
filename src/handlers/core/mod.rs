// handlers/core/mod.rs - endpoints of the always-granted core module

pub mod partition; // GET /api/v1/core/partition

pub use partition::partition_info;
