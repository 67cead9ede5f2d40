use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use orchestrator_core::{
    models::{
        ArtifactScope, BackupArtifact, BackupJob, JobFilter, MaxAgeMode, RetentionPolicy,
        RotationOutcome, RotationPreview,
    },
    traits::{
        ArtifactRepository, JobRepository, LifecycleEvent, Notifier, RetentionPolicyRepository,
        RotationEventPayload,
    },
    OrchestratorError, OrchestratorResult,
};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::keyed_lock::KeyedLock;
use crate::rotation::plan_rotation;
use crate::run_executor::emit_event;

/// 保留轮换服务
///
/// 把纯函数引擎的计划落到运行台账上。同一作用域的轮换先在进程内按
/// `(job_id, destination_id)` 串行，再由仓储的事务保证跨进程互斥。
pub struct RotationService {
    job_repo: Arc<dyn JobRepository>,
    artifact_repo: Arc<dyn ArtifactRepository>,
    policy_repo: Arc<dyn RetentionPolicyRepository>,
    notifier: Arc<dyn Notifier>,
    locks: KeyedLock<ArtifactScope>,
    mode: MaxAgeMode,
    metrics: MetricsCollector,
}

impl RotationService {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        artifact_repo: Arc<dyn ArtifactRepository>,
        policy_repo: Arc<dyn RetentionPolicyRepository>,
        notifier: Arc<dyn Notifier>,
        mode: MaxAgeMode,
    ) -> Self {
        Self {
            job_repo,
            artifact_repo,
            policy_repo,
            notifier,
            locks: KeyedLock::new(),
            mode,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn mode(&self) -> MaxAgeMode {
        self.mode
    }

    async fn resolve_policy(&self, policy_id: i64) -> OrchestratorResult<RetentionPolicy> {
        self.policy_repo
            .get_by_id(policy_id)
            .await?
            .ok_or(OrchestratorError::RetentionPolicyNotFound { id: policy_id })
    }

    /// 对一个作用域应用策略并持久化删除
    pub async fn apply(
        &self,
        scope: ArtifactScope,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<RotationOutcome> {
        let _guard = self.locks.lock(scope).await?;

        let mode = self.mode;
        let planner =
            move |artifacts: &[BackupArtifact]| plan_rotation(artifacts, policy, now, mode);
        let plan = self.artifact_repo.rotate_scope(&scope, &planner, now).await?;
        let outcome = plan.outcome();

        self.metrics.record_rotation(outcome.deleted, outcome.kept);
        StructuredLogger::log_rotation_completed(
            &policy.name,
            scope.job_id,
            scope.destination_id,
            outcome.total,
            outcome.deleted,
        );
        Ok(outcome)
    }

    /// 预览：计算与 [`apply`](Self::apply) 相同的删除集合，但不做任何写入
    pub async fn preview(
        &self,
        policy_id: i64,
        scope: ArtifactScope,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<RotationPreview> {
        let policy = self.resolve_policy(policy_id).await?;
        let snapshot = self.artifact_repo.list_non_deleted(&scope).await?;
        let plan = plan_rotation(&snapshot, &policy, now, self.mode);
        debug!(
            "轮换预览 policy={} job={} dest={:?}: 保留 {} 删除 {}",
            policy.name,
            scope.job_id,
            scope.destination_id,
            plan.would_keep(),
            plan.to_delete.len()
        );
        Ok(plan.preview())
    }

    /// 一次成功运行之后，对任务的每个目标存储按其有效策略轮换
    ///
    /// 某个目标存储解析不到策略或轮换出错时只跳过该目标存储，不影响其余目标，也不影响运行结果。
    pub async fn rotate_after_run(
        &self,
        job: &BackupJob,
        destination_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Vec<(i64, RotationOutcome)> {
        let mut results = Vec::new();
        for &destination_id in destination_ids {
            let Some(policy_id) = job.effective_policy_id(destination_id) else {
                debug!("任务 {} 的目标存储 {} 未配置保留策略，跳过轮换", job.name, destination_id);
                continue;
            };

            let policy = match self.resolve_policy(policy_id).await {
                Ok(policy) => policy,
                Err(e) => {
                    warn!(
                        "任务 {} 的目标存储 {} 保留策略解析失败，跳过轮换: {}",
                        job.name, destination_id, e
                    );
                    continue;
                }
            };

            let scope = ArtifactScope::destination(job.id, destination_id);
            match self.apply(scope, &policy, now).await {
                Ok(outcome) => results.push((destination_id, outcome)),
                Err(e) => warn!(
                    "任务 {} 的目标存储 {} 轮换失败: {}",
                    job.name, destination_id, e
                ),
            }
        }
        results
    }

    /// 策略实际生效的 (任务, 目标存储) 作用域
    ///
    /// 只包含有效策略（覆盖优先，其次任务默认策略）等于 `policy_id` 的目标存储。
    async fn policy_scopes(
        &self,
        policy_id: i64,
        job_id: Option<i64>,
    ) -> OrchestratorResult<Vec<(BackupJob, ArtifactScope)>> {
        let jobs = match job_id {
            Some(id) => vec![self
                .job_repo
                .get_by_id(id)
                .await?
                .ok_or(OrchestratorError::JobNotFound { id })?],
            None => self.job_repo.list(&JobFilter::default()).await?,
        };

        let mut scopes = Vec::new();
        for job in jobs {
            for &destination_id in &job.destination_ids {
                if job.effective_policy_id(destination_id) == Some(policy_id) {
                    scopes.push((job.clone(), ArtifactScope::destination(job.id, destination_id)));
                }
            }
        }
        Ok(scopes)
    }

    /// [`run_policy`](Self::run_policy) 的预览：遍历相同的作用域，逐个计划后合并，不做任何写入
    pub async fn preview_policy(
        &self,
        policy_id: i64,
        job_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<RotationPreview> {
        let policy = self.resolve_policy(policy_id).await?;

        let mut combined = RotationPreview::default();
        for (_, scope) in self.policy_scopes(policy_id, job_id).await? {
            let snapshot = self.artifact_repo.list_non_deleted(&scope).await?;
            let preview = plan_rotation(&snapshot, &policy, now, self.mode).preview();
            combined.total += preview.total;
            combined.would_keep += preview.would_keep;
            combined.would_delete += preview.would_delete;
            combined.artifacts.extend(preview.artifacts);
        }
        Ok(combined)
    }

    /// 独立的轮换任务：把策略应用到所有引用它的作用域
    ///
    /// `job_id` 为 `Some` 时只处理该任务。有产物被删除时发出 `rotation.completed`。
    pub async fn run_policy(
        &self,
        policy_id: i64,
        job_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<RotationOutcome> {
        let policy = self.resolve_policy(policy_id).await?;

        let mut summary = RotationOutcome::default();
        for (job, scope) in self.policy_scopes(policy_id, job_id).await? {
            match self.apply(scope, &policy, now).await {
                Ok(outcome) => {
                    summary.total += outcome.total;
                    summary.kept += outcome.kept;
                    summary.deleted += outcome.deleted;
                    summary.deleted_ids.extend(outcome.deleted_ids);
                }
                Err(e) => warn!(
                    "策略 {} 在任务 {} 目标存储 {:?} 上轮换失败: {}",
                    policy.name, job.name, scope.destination_id, e
                ),
            }
        }

        if summary.deleted > 0 {
            let payload = RotationEventPayload {
                policy_name: policy.name.clone(),
                job_id,
                kept: summary.kept,
                deleted: summary.deleted,
            };
            emit_event(
                self.notifier.as_ref(),
                &self.metrics,
                LifecycleEvent::RotationCompleted,
                &payload,
            )
            .await;
        }

        info!(
            "保留策略 {} 轮换完成: 保留 {} 删除 {}",
            policy.name, summary.kept, summary.deleted
        );
        Ok(summary)
    }
}
