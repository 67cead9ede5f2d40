//! Dispatcher
//!
//! Cron evaluation, the scheduler loop, the run executor state machine,
//! retry policy, GFS retention rotation and the run controller.

pub mod cancellation;
pub mod controller;
pub mod cron_utils;
pub mod keyed_lock;
pub mod retry_service;
pub mod rotation;
pub mod rotation_service;
pub mod run_executor;
pub mod scheduler;
pub mod worker_pool;

// Re-export key components used by the composition root
pub use cancellation::CancellationRegistry;
pub use controller::RunController;
pub use cron_utils::CronScheduler;
pub use retry_service::{RetryConfig, RetryDecision, RetryPolicy};
pub use rotation::plan_rotation;
pub use rotation_service::RotationService;
pub use run_executor::RunExecutor;
pub use scheduler::BackupScheduler;
pub use worker_pool::WorkerPool;
