pub mod models;
pub mod plan_store;

pub use models::{MigrationItem, MigrationProgress, MigrationStatus, Network, Plan};
pub use plan_store::{PlanStore, StoreError};
