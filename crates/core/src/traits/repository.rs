//! 运行台账（Run Ledger）仓储接口定义
//!
//! 此模块定义了编排核心所需的持久化抽象接口：
//! - 任务仓储接口 (JobRepository)
//! - 运行实例仓储接口 (RunRepository)
//! - 备份产物仓储接口 (ArtifactRepository)
//! - 保留策略仓储接口 (RetentionPolicyRepository)
//! - 备份目标仓储接口 (TargetRepository)
//!
//! ## 一致性要求
//!
//! 核心组件之间不共享任何进程内缓存，所有去重与轮换状态都落在台账中，
//! 因此实现必须提供两种原子操作：
//! - 调度去重的"检查后插入"：[`RunRepository::create_if_absent_since`]
//! - 轮换的"读取快照后批量更新"：[`ArtifactRepository::rotate_scope`]
//!
//! 运行实例的终态写入以 `status = running` 为前提条件，保证并发的取消请求与
//! 执行器之间只有一方能完成状态迁移。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{
        ArtifactScope, BackupArtifact, BackupJob, BackupRun, JobFilter, RetentionPolicy,
        RotationPlan, RunFilter, RunLogEntry, Target,
    },
    OrchestratorResult,
};

/// 轮换规划函数：输入按创建时间倒序排列的未删除产物快照，输出轮换计划
pub type RotationPlanner<'a> = dyn Fn(&[BackupArtifact]) -> RotationPlan + Send + Sync + 'a;

/// 任务仓储接口
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建新任务，返回包含数据库生成ID的任务
    async fn create(&self, job: &BackupJob) -> OrchestratorResult<BackupJob>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupJob>>;

    async fn update(&self, job: &BackupJob) -> OrchestratorResult<()>;

    async fn list(&self, filter: &JobFilter) -> OrchestratorResult<Vec<BackupJob>>;

    /// 获取所有启用的任务，调度循环每个周期调用一次
    async fn get_active_jobs(&self) -> OrchestratorResult<Vec<BackupJob>>;

    /// 切换启用状态，这是核心唯一会修改的任务字段
    async fn set_active(&self, id: i64, is_active: bool) -> OrchestratorResult<()>;
}

/// 运行实例仓储接口
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// 无条件创建运行实例（手动触发、重启）
    async fn create(&self, run: &BackupRun) -> OrchestratorResult<BackupRun>;

    /// 原子的检查后插入
    ///
    /// 仅当该任务不存在 `created_at >= window_start` 的运行实例时才插入 `run`。
    /// 已存在时返回 `None`。多个调度实例并发执行时，同一窗口最多插入一条记录。
    async fn create_if_absent_since(
        &self,
        run: &BackupRun,
        window_start: DateTime<Utc>,
    ) -> OrchestratorResult<Option<BackupRun>>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupRun>>;

    /// 按过滤条件查询，结果按创建时间倒序
    async fn list(&self, filter: &RunFilter) -> OrchestratorResult<Vec<BackupRun>>;

    /// 是否已存在创建时间不早于 `since` 的运行实例
    async fn exists_since(&self, job_id: i64, since: DateTime<Utc>) -> OrchestratorResult<bool>;

    /// 条件写入：仅当库中状态仍为 `running` 时覆盖运行实例的可变字段
    ///
    /// 返回 `false` 表示运行实例已被其他参与方（通常是取消请求）迁移到终态，
    /// 本次写入被拒绝。
    async fn update_if_running(&self, run: &BackupRun) -> OrchestratorResult<bool>;

    /// 条件取消：`running -> cancelled`，同时写入完成时间并追加日志
    async fn cancel_if_running(
        &self,
        id: i64,
        at: DateTime<Utc>,
        entry: &RunLogEntry,
    ) -> OrchestratorResult<bool>;

    /// 追加一条日志，不检查状态
    async fn append_log(&self, id: i64, entry: &RunLogEntry) -> OrchestratorResult<()>;
}

/// 备份产物仓储接口
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// 在单个事务中批量创建产物记录
    async fn create_batch(
        &self,
        artifacts: &[BackupArtifact],
    ) -> OrchestratorResult<Vec<BackupArtifact>>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupArtifact>>;

    async fn list_by_run(&self, run_id: i64) -> OrchestratorResult<Vec<BackupArtifact>>;

    /// 作用域内未删除的产物，按创建时间倒序
    async fn list_non_deleted(
        &self,
        scope: &ArtifactScope,
    ) -> OrchestratorResult<Vec<BackupArtifact>>;

    /// 软删除，返回实际被标记的数量（已删除的不重复计数）
    async fn mark_deleted(&self, ids: &[i64], at: DateTime<Utc>) -> OrchestratorResult<u64>;

    /// 在一个事务内读取作用域快照、调用规划函数并批量软删除
    ///
    /// 同一作用域的两次并发轮换不会基于过期快照计算保留集合。
    async fn rotate_scope(
        &self,
        scope: &ArtifactScope,
        planner: &RotationPlanner<'_>,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<RotationPlan>;
}

/// 保留策略仓储接口
#[async_trait]
pub trait RetentionPolicyRepository: Send + Sync {
    async fn create(&self, policy: &RetentionPolicy) -> OrchestratorResult<RetentionPolicy>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<RetentionPolicy>>;

    async fn list(&self) -> OrchestratorResult<Vec<RetentionPolicy>>;
}

/// 备份目标仓储接口
#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn create(&self, target: &Target) -> OrchestratorResult<Target>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Target>>;
}
