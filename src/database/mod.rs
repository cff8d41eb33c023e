pub mod bootstrap;
pub mod manager;
pub mod models;
pub mod partition;
pub mod pg_partition;
pub mod pg_store;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use partition::{PartitionBackend, PartitionError, PartitionName, PartitionProvisioner, PartitionRouter, TenantHandle};
pub use pg_partition::PgPartitionBackend;
pub use pg_store::PgTenantStore;
pub use store::{Page, PageRequest, StoreError, TenantFilter, TenantStore};
