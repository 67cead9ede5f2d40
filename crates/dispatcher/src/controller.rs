use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use orchestrator_core::{
    models::{BackupJob, BackupRun, LogLevel, RunLogEntry, RunStatus, TriggerSource},
    traits::{
        JobRepository, LifecycleEvent, Notifier, RetentionPolicyRepository, RunEventPayload,
        RunRepository, TargetRepository,
    },
    OrchestratorError, OrchestratorResult, StrategyRegistry,
};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::cron_utils::CronScheduler;
use crate::run_executor::emit_event;
use crate::worker_pool::WorkerPool;

/// 运行控制器：外部请求的入口
///
/// 手动触发、取消、重启失败的运行实例、创建任务（边界校验）以及调度预览。
pub struct RunController {
    job_repo: Arc<dyn JobRepository>,
    run_repo: Arc<dyn RunRepository>,
    target_repo: Arc<dyn TargetRepository>,
    policy_repo: Arc<dyn RetentionPolicyRepository>,
    strategies: Arc<StrategyRegistry>,
    notifier: Arc<dyn Notifier>,
    pool: Arc<WorkerPool>,
    metrics: MetricsCollector,
}

impl RunController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        run_repo: Arc<dyn RunRepository>,
        target_repo: Arc<dyn TargetRepository>,
        policy_repo: Arc<dyn RetentionPolicyRepository>,
        strategies: Arc<StrategyRegistry>,
        notifier: Arc<dyn Notifier>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            job_repo,
            run_repo,
            target_repo,
            policy_repo,
            strategies,
            notifier,
            pool,
            metrics: MetricsCollector::new(),
        }
    }

    async fn load_job(&self, job_id: i64) -> OrchestratorResult<BackupJob> {
        self.job_repo
            .get_by_id(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id: job_id })
    }

    async fn load_run(&self, run_id: i64) -> OrchestratorResult<BackupRun> {
        self.run_repo
            .get_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound { id: run_id })
    }

    async fn dispatch(&self, job: &BackupJob, run: BackupRun) -> OrchestratorResult<BackupRun> {
        let run = self.run_repo.create(&run).await?;
        StructuredLogger::log_run_dispatched(
            run.id,
            job.id,
            &job.name,
            run.triggered_by.as_str(),
            None,
        );
        self.metrics.record_run_dispatched(run.triggered_by.as_str());
        self.pool.submit(run.clone())?;
        Ok(run)
    }

    /// 手动触发：跳过CRON检查，总是创建新的运行实例
    pub async fn trigger_manual(&self, job_id: i64) -> OrchestratorResult<BackupRun> {
        let job = self.load_job(job_id).await?;
        let mut run = BackupRun::new(job.id, job.target_id, TriggerSource::Manual);
        run.log(LogLevel::Info, "Backup triggered manually");

        let run = self.dispatch(&job, run).await?;
        info!("手动触发任务 {}，运行实例 {}", job.name, run.id);
        Ok(run)
    }

    /// 取消运行中的实例
    ///
    /// 只翻转台账中的状态并触发取消令牌。正在执行的备份策略是否及时停止取决于
    /// 策略自身对令牌的响应，尽力而为。
    pub async fn cancel_run(&self, run_id: i64) -> OrchestratorResult<BackupRun> {
        let run = self.load_run(run_id).await?;
        if run.status != RunStatus::Running {
            return Err(OrchestratorError::CannotCancel {
                id: run_id,
                status: run.status,
            });
        }

        let now = Utc::now();
        let entry = RunLogEntry::new(LogLevel::Warn, "Run cancelled by request");
        if !self.run_repo.cancel_if_running(run_id, now, &entry).await? {
            // 与执行器的终态写入竞争失败
            let current = self.load_run(run_id).await?;
            return Err(OrchestratorError::CannotCancel {
                id: run_id,
                status: current.status,
            });
        }

        let signalled = self.pool.executor().cancellations().cancel(run_id);
        debug!(
            "运行实例 {} 已标记为取消，本进程内令牌{}",
            run_id,
            if signalled { "已触发" } else { "不存在" }
        );

        let cancelled = self.load_run(run_id).await?;
        self.announce_cancelled(&cancelled).await;
        Ok(cancelled)
    }

    async fn announce_cancelled(&self, run: &BackupRun) {
        let job = self.job_repo.get_by_id(run.job_id).await.ok().flatten();
        let target = self.target_repo.get_by_id(run.target_id).await.ok().flatten();
        let job_name = job.as_ref().map(|j| j.name.clone()).unwrap_or_default();
        let duration = run.duration_seconds();

        StructuredLogger::log_run_finished(
            run.id,
            &job_name,
            run.status.as_str(),
            run.size_bytes,
            duration,
            None,
        );
        self.metrics.record_run_finished(
            job.as_ref().map(|j| j.backup_type.as_str()).unwrap_or("unknown"),
            run.status.as_str(),
            duration.unwrap_or_default(),
        );

        let payload = RunEventPayload {
            run_id: run.id,
            job_name,
            target_name: target.map(|t| t.name).unwrap_or_default(),
            size_bytes: run.size_bytes,
            error: run.error_message.clone(),
            duration_seconds: duration,
        };
        emit_event(
            self.notifier.as_ref(),
            &self.metrics,
            LifecycleEvent::RunCancelled,
            &payload,
        )
        .await;
    }

    /// 重启一个失败的运行实例：创建触发来源为 `retry` 的新实例，沿用重试次数
    pub async fn restart_run(&self, run_id: i64) -> OrchestratorResult<BackupRun> {
        let previous = self.load_run(run_id).await?;
        if previous.status != RunStatus::Failed {
            return Err(OrchestratorError::InvalidRunState {
                id: run_id,
                status: previous.status,
            });
        }

        let job = self.load_job(previous.job_id).await?;
        let mut run = BackupRun::new(job.id, job.target_id, TriggerSource::Retry);
        run.retry_count = previous.retry_count;
        run.log(
            LogLevel::Info,
            format!("Restarted from failed run {}", previous.id),
        );

        let run = self.dispatch(&job, run).await?;
        info!("任务 {} 的失败实例 {} 已重启为 {}", job.name, previous.id, run.id);
        Ok(run)
    }

    /// 创建任务，在边界处拒绝配置错误
    pub async fn create_job(&self, mut job: BackupJob) -> OrchestratorResult<BackupJob> {
        job.schedule_cron = CronScheduler::normalize(&job.schedule_cron)?;
        CronScheduler::validate_cron_expression(&job.schedule_cron)?;

        if !self.strategies.contains(&job.backup_type) {
            return Err(OrchestratorError::UnknownBackupType(job.backup_type));
        }
        if self.target_repo.get_by_id(job.target_id).await?.is_none() {
            return Err(OrchestratorError::TargetNotFound { id: job.target_id });
        }

        let mut policy_ids: Vec<i64> = job.retention_overrides.values().copied().collect();
        policy_ids.extend(job.retention_policy_id);
        policy_ids.sort_unstable();
        policy_ids.dedup();
        for policy_id in policy_ids {
            if self.policy_repo.get_by_id(policy_id).await?.is_none() {
                return Err(OrchestratorError::RetentionPolicyNotFound { id: policy_id });
            }
        }

        if job.max_retries < 0 {
            return Err(OrchestratorError::Configuration(format!(
                "max_retries 不能为负数: {}",
                job.max_retries
            )));
        }
        if job.destination_ids.is_empty() {
            warn!("任务 {} 未配置目标存储，产物不会被记录", job.name);
        }

        let created = self.job_repo.create(&job).await?;
        info!("创建备份任务 {} ({})", created.name, created.schedule_cron);
        Ok(created)
    }

    /// 任务接下来的 `count` 次触发时间
    pub async fn schedule_preview(
        &self,
        job_id: i64,
        count: usize,
    ) -> OrchestratorResult<Vec<DateTime<Utc>>> {
        let job = self.load_job(job_id).await?;
        let cron = CronScheduler::new(&job.schedule_cron)?;
        Ok(cron.next_fire_times(Utc::now(), count))
    }
}
