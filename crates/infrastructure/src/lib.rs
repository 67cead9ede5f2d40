//! 基础设施层：SQLite 运行台账、可观测性与默认通知器

pub mod database;
pub mod notifier;
pub mod observability;

pub use database::*;
pub use notifier::LoggingNotifier;
pub use observability::*;
