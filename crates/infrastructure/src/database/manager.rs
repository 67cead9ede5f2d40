use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::{
    config::DatabaseConfig,
    traits::{
        ArtifactRepository, JobRepository, RetentionPolicyRepository, RunRepository,
        TargetRepository,
    },
    OrchestratorResult,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::sqlite::{
    SqliteArtifactRepository, SqliteJobRepository, SqliteRetentionPolicyRepository,
    SqliteRunRepository, SqliteTargetRepository,
};

/// 运行台账数据库管理器
///
/// 持有连接池并作为各仓储实现的工厂。
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> OrchestratorResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.connection_timeout_seconds));
        if !config.is_in_memory() {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(options)
            .await?;

        let manager = Self { pool };
        if config.run_migrations {
            manager.migrate().await?;
        }

        info!("运行台账数据库连接成功");
        Ok(manager)
    }

    /// 使用已有连接池，测试中常用
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> OrchestratorResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn health_check(&self) -> OrchestratorResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn job_repository(&self) -> Arc<dyn JobRepository> {
        Arc::new(SqliteJobRepository::new(self.pool.clone()))
    }

    pub fn run_repository(&self) -> Arc<dyn RunRepository> {
        Arc::new(SqliteRunRepository::new(self.pool.clone()))
    }

    pub fn artifact_repository(&self) -> Arc<dyn ArtifactRepository> {
        Arc::new(SqliteArtifactRepository::new(self.pool.clone()))
    }

    pub fn retention_policy_repository(&self) -> Arc<dyn RetentionPolicyRepository> {
        Arc::new(SqliteRetentionPolicyRepository::new(self.pool.clone()))
    }

    pub fn target_repository(&self) -> Arc<dyn TargetRepository> {
        Arc::new(SqliteTargetRepository::new(self.pool.clone()))
    }
}
