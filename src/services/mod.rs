pub mod migration_service;
pub mod splitter;

pub use migration_service::{MigrationContext, MigrationScheduler, TickOutcome};
