pub mod app_config;
pub mod database;
pub mod observability;
pub mod scheduler_executor;

pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use observability::ObservabilityConfig;
pub use scheduler_executor::{ExecutorConfig, RotationConfig, SchedulerConfig};
