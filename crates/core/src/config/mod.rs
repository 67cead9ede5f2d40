//! 编排器配置
//!
//! 配置来源按优先级从低到高依次为：内置默认值、TOML配置文件、
//! 以 `ORCHESTRATOR_` 为前缀的环境变量（嵌套字段用 `__` 分隔，
//! 例如 `ORCHESTRATOR_SCHEDULER__POLL_INTERVAL_SECONDS=30`）。

pub mod models;

pub use models::*;
