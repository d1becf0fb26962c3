pub mod config;
pub mod database_ops;
pub mod migration;
pub mod normalization;
pub mod orchestrator;
pub mod telemetry;

pub mod util {
    pub mod env;
}

pub use config::{ConfigError, MigrationConfig};
pub use migration::{MigrationContext, RunReport, RunStats};
pub use orchestrator::{run_migration, Backends, RunOptions};
