use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use orchestrator_core::{config::AppConfig, traits::Notifier, StrategyRegistry};
use orchestrator_dispatcher::{
    BackupScheduler, CancellationRegistry, RotationService, RunController, RunExecutor,
    WorkerPool,
};
use orchestrator_infrastructure::{DatabaseManager, LoggingNotifier};
use orchestrator_worker::LocalCommandStrategy;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 关闭时等待在途运行实例结束的最长时间
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 主应用程序：持有台账连接与全部编排组件
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    pool: Arc<WorkerPool>,
    scheduler: BackupScheduler,
    controller: RunController,
    rotation: Arc<RotationService>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化运行台账失败")?;

        let job_repo = database.job_repository();
        let run_repo = database.run_repository();
        let artifact_repo = database.artifact_repository();
        let policy_repo = database.retention_policy_repository();
        let target_repo = database.target_repository();
        let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier::new());

        let strategies = Arc::new(build_strategy_registry());
        info!("已注册备份类型: {:?}", strategies.backup_types());

        let rotation = Arc::new(RotationService::new(
            Arc::clone(&job_repo),
            Arc::clone(&artifact_repo),
            Arc::clone(&policy_repo),
            Arc::clone(&notifier),
            config.rotation.max_age_mode,
        ));

        let executor = Arc::new(RunExecutor::new(
            Arc::clone(&job_repo),
            Arc::clone(&run_repo),
            artifact_repo,
            Arc::clone(&target_repo),
            Arc::clone(&strategies),
            Arc::clone(&rotation),
            Arc::clone(&notifier),
            CancellationRegistry::new(),
            &config.executor,
        ));

        let pool = Arc::new(WorkerPool::new(
            executor,
            config.scheduler.max_concurrent_runs,
            config.scheduler.exclusive_per_job,
        ));

        let scheduler = BackupScheduler::new(
            Arc::clone(&job_repo),
            Arc::clone(&run_repo),
            Arc::clone(&pool),
            config.scheduler.clone(),
        );

        let controller = RunController::new(
            job_repo,
            run_repo,
            target_repo,
            policy_repo,
            strategies,
            notifier,
            Arc::clone(&pool),
        );

        Ok(Self {
            config,
            database,
            pool,
            scheduler,
            controller,
            rotation,
        })
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    pub fn rotation(&self) -> &RotationService {
        &self.rotation
    }

    /// 运行调度循环直到收到关闭信号，然后等待在途运行实例结束
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "启动备份编排服务，并发上限 {}",
            self.config.scheduler.max_concurrent_runs
        );

        self.scheduler.run(shutdown_rx).await;
        self.drain().await;
        Ok(())
    }

    /// 等待工作池中的运行实例结束
    pub async fn drain(&self) {
        let pending = self.pool.pending();
        if pending > 0 {
            info!("等待 {} 个运行实例结束", pending);
        }
        if tokio::time::timeout(DRAIN_TIMEOUT, self.pool.drain())
            .await
            .is_err()
        {
            warn!(
                "等待运行实例结束超时（{}秒），未结束的实例保持 running 状态",
                DRAIN_TIMEOUT.as_secs()
            );
        }
    }

    pub async fn close(&self) {
        self.database.close().await;
    }
}

/// 本机可执行的备份类型
fn build_strategy_registry() -> StrategyRegistry {
    let local = Arc::new(LocalCommandStrategy::new());
    StrategyRegistry::new()
        .with_strategy("files", local.clone())
        .with_strategy("custom", local)
}
