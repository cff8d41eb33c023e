// handlers/mod.rs - HTTP handlers grouped by route family
//
// health:  public liveness and readiness (/, /health)
// tenants: management plane (/api/v1/tenants/*), bypasses the module gate
// core:    tenant-scoped endpoints behind the module gate (/api/v1/core/*)

pub mod core;
pub mod health;
pub mod tenants;
