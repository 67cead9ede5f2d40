//! 备份编排核心：领域模型、错误类型、配置与各组件之间的接口

pub mod config;
pub mod errors;
pub mod models;
pub mod strategy_registry;
pub mod traits;

pub use errors::{OrchestratorError, OrchestratorResult};
pub use strategy_registry::StrategyRegistry;
