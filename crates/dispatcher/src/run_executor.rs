//! 运行执行器：备份运行实例的生命周期状态机
//!
//! ```text
//!            ┌──────── 重试（同一条记录，retry_count + 1）────────┐
//!            ▼                                                   │
//!  Running ──┼── 策略成功 ─────────────────────────► Success / Partial
//!            ├── 策略失败 / 超时 ── 预算未耗尽 ───────────────────┘
//!            │                    └─ 预算耗尽 ─────► Failed
//!            └── 外部取消（控制器写入）──────────────► Cancelled
//! ```
//!
//! 所有终态写入都以台账中 `status = running` 为前提。写入被拒绝说明运行已被
//! 取消，执行器只追加一条日志，不再发出任何事件。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use orchestrator_core::{
    config::ExecutorConfig,
    models::{
        BackupArtifact, BackupJob, BackupRun, LogLevel, RunLogEntry, RunStatus, Target,
    },
    traits::{
        ArtifactRepository, BackupContext, BackupOutcome, JobRepository, LifecycleEvent,
        Notifier, RunEventPayload, RunRepository, TargetRepository,
    },
    OrchestratorError, OrchestratorResult, StrategyRegistry,
};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::cancellation::CancellationRegistry;
use crate::retry_service::{RetryConfig, RetryDecision, RetryPolicy};
use crate::rotation_service::RotationService;

/// 一次尝试的归类结果
enum AttemptResult {
    Succeeded {
        outcome: BackupOutcome,
        succeeded_destinations: Vec<i64>,
    },
    Failed {
        message: String,
        logs: Vec<RunLogEntry>,
    },
    /// 策略拒绝了任务配置，重试没有意义
    Rejected(OrchestratorError),
}

/// 运行执行器
pub struct RunExecutor {
    job_repo: Arc<dyn JobRepository>,
    run_repo: Arc<dyn RunRepository>,
    artifact_repo: Arc<dyn ArtifactRepository>,
    target_repo: Arc<dyn TargetRepository>,
    strategies: Arc<StrategyRegistry>,
    rotation: Arc<RotationService>,
    notifier: Arc<dyn Notifier>,
    cancellations: CancellationRegistry,
    retry_policy: RetryPolicy,
    default_timeout: Duration,
    metrics: MetricsCollector,
}

impl RunExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        run_repo: Arc<dyn RunRepository>,
        artifact_repo: Arc<dyn ArtifactRepository>,
        target_repo: Arc<dyn TargetRepository>,
        strategies: Arc<StrategyRegistry>,
        rotation: Arc<RotationService>,
        notifier: Arc<dyn Notifier>,
        cancellations: CancellationRegistry,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            job_repo,
            run_repo,
            artifact_repo,
            target_repo,
            strategies,
            rotation,
            notifier,
            cancellations,
            retry_policy: RetryPolicy::new(RetryConfig::from(config)),
            default_timeout: Duration::from_secs(config.default_timeout_seconds),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    /// 执行一个已分派的运行实例直到终态，返回台账中的最终记录
    pub async fn execute(&self, run: BackupRun) -> OrchestratorResult<BackupRun> {
        let run_id = run.id;
        let token = self.cancellations.register(run_id);
        self.metrics
            .update_runs_in_flight(self.cancellations.in_flight());

        let result = self.drive(run, &token).await;

        self.cancellations.remove(run_id);
        self.metrics
            .update_runs_in_flight(self.cancellations.in_flight());

        if let Err(e) = &result {
            error!("运行实例 {} 执行出错: {}", run_id, e);
        }
        result
    }

    async fn drive(
        &self,
        mut run: BackupRun,
        token: &CancellationToken,
    ) -> OrchestratorResult<BackupRun> {
        // 排队期间可能已被取消
        if let Some(current) = self.run_repo.get_by_id(run.id).await? {
            if !current.is_running() {
                debug!("运行实例 {} 已处于 {} 状态，不再执行", run.id, current.status);
                return Ok(current);
            }
        }

        let job = match self.job_repo.get_by_id(run.job_id).await? {
            Some(job) => job,
            None => {
                let error = OrchestratorError::JobNotFound { id: run.job_id };
                return self.fail_before_attempt(run, None, None, error).await;
            }
        };
        let target = match self.target_repo.get_by_id(run.target_id).await? {
            Some(target) => target,
            None => {
                let error = OrchestratorError::TargetNotFound { id: run.target_id };
                return self.fail_before_attempt(run, Some(&job), None, error).await;
            }
        };
        let strategy = match self.strategies.resolve(&job.backup_type) {
            Ok(strategy) => strategy,
            Err(e) => return self.fail_before_attempt(run, Some(&job), Some(&target), e).await,
        };

        loop {
            if token.is_cancelled() {
                debug!("运行实例 {} 已被取消，停止执行", run.id);
                return self.reload(run).await;
            }

            StructuredLogger::log_attempt_start(
                run.id,
                &job.name,
                &job.backup_type,
                run.retry_count,
            );
            let context = BackupContext {
                run_id: run.id,
                retry_count: run.retry_count,
                job: job.clone(),
                target: target.clone(),
            };

            let timeout = self.timeout_for(&job);
            let attempt =
                tokio::time::timeout(timeout, strategy.execute(&context, token.child_token())).await;

            match self.classify(&job, attempt, timeout) {
                AttemptResult::Succeeded {
                    outcome,
                    succeeded_destinations,
                } => {
                    return self
                        .complete(run, &job, &target, outcome, succeeded_destinations)
                        .await;
                }
                AttemptResult::Rejected(error) => {
                    return self
                        .fail_before_attempt(run, Some(&job), Some(&target), error)
                        .await;
                }
                AttemptResult::Failed { message, logs } => {
                    run.log_lines.extend(logs);
                    run.log(LogLevel::Error, format!("Backup attempt failed: {message}"));
                    run.error_message = Some(message.clone());

                    match self.retry_policy.decide(&job, run.retry_count) {
                        RetryDecision::Retry { retry_count, delay } => {
                            run.retry_count = retry_count;
                            run.log(
                                LogLevel::Warn,
                                format!(
                                    "Retrying in {}s (attempt {}/{})",
                                    delay.as_secs(),
                                    retry_count,
                                    job.max_retries
                                ),
                            );
                            if !self.run_repo.update_if_running(&run).await? {
                                StructuredLogger::log_terminal_write_rejected(run.id, "running");
                                return self.reload(run).await;
                            }

                            self.metrics.record_run_retry(&job.backup_type);
                            StructuredLogger::log_run_retry(
                                run.id,
                                &job.name,
                                retry_count,
                                job.max_retries,
                                delay.as_secs(),
                                &message,
                            );

                            if !self.retry_policy.wait(delay, token).await {
                                debug!("运行实例 {} 在退避期间被取消", run.id);
                                return self.reload(run).await;
                            }
                        }
                        RetryDecision::GiveUp => {
                            return self
                                .finish(run, &job, Some(&target), RunStatus::Failed)
                                .await;
                        }
                    }
                }
            }
        }
    }

    fn timeout_for(&self, job: &BackupJob) -> Duration {
        match job.timeout_seconds {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            _ => self.default_timeout,
        }
    }

    /// 把策略返回值、错误与超时统一为成功或可重试的失败
    fn classify(
        &self,
        job: &BackupJob,
        attempt: Result<OrchestratorResult<BackupOutcome>, tokio::time::error::Elapsed>,
        timeout: Duration,
    ) -> AttemptResult {
        let outcome = match attempt {
            Err(_) => {
                let error = OrchestratorError::ExecutionTimeout {
                    seconds: timeout.as_secs(),
                };
                return AttemptResult::Failed {
                    message: error.to_string(),
                    logs: Vec::new(),
                };
            }
            Ok(Err(e)) if e.is_configuration() => return AttemptResult::Rejected(e),
            Ok(Err(e)) => {
                return AttemptResult::Failed {
                    message: e.to_string(),
                    logs: Vec::new(),
                }
            }
            Ok(Ok(outcome)) => outcome,
        };

        if !outcome.success {
            return AttemptResult::Failed {
                message: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
                logs: outcome.logs,
            };
        }

        let failed: HashSet<i64> = outcome.failed_destinations.iter().copied().collect();
        let succeeded_destinations: Vec<i64> = job
            .destination_ids
            .iter()
            .copied()
            .filter(|d| !failed.contains(d))
            .collect();

        if succeeded_destinations.is_empty() && !job.destination_ids.is_empty() {
            return AttemptResult::Failed {
                message: "Upload failed for every destination".to_string(),
                logs: outcome.logs,
            };
        }

        AttemptResult::Succeeded {
            outcome,
            succeeded_destinations,
        }
    }

    /// 成功路径：终态写入、产物记录、按目标存储轮换、事件
    async fn complete(
        &self,
        mut run: BackupRun,
        job: &BackupJob,
        target: &Target,
        outcome: BackupOutcome,
        succeeded_destinations: Vec<i64>,
    ) -> OrchestratorResult<BackupRun> {
        let partial = succeeded_destinations.len() < job.destination_ids.len();
        let status = if partial {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };

        run.size_bytes = outcome.size_bytes;
        run.log_lines.extend(outcome.logs.iter().cloned());
        if partial {
            let message = format!(
                "Upload failed for destinations {:?}",
                outcome.failed_destinations
            );
            run.log(LogLevel::Warn, message.clone());
            run.error_message = Some(message);
        } else {
            run.error_message = None;
        }
        run.log(
            LogLevel::Info,
            format!("Backup complete: {} ({} bytes)", outcome.filename, outcome.size_bytes),
        );

        let now = Utc::now();
        run.finish(status, now);
        if !self.write_terminal(&run).await? {
            return self.reload(run).await;
        }

        self.metrics
            .record_backup_size(&job.backup_type, outcome.size_bytes);
        self.record_artifacts(&run, job, target, &outcome, &succeeded_destinations)
            .await;
        self.rotation
            .rotate_after_run(job, &succeeded_destinations, now)
            .await;

        self.announce(&run, job, Some(target)).await;
        Ok(run)
    }

    async fn record_artifacts(
        &self,
        run: &BackupRun,
        job: &BackupJob,
        target: &Target,
        outcome: &BackupOutcome,
        destinations: &[i64],
    ) {
        if outcome.filename.is_empty() || outcome.checksum_sha256.is_empty() {
            warn!("运行实例 {} 未返回文件名或校验和，不记录备份产物", run.id);
            return;
        }

        let created_at = Utc::now();
        let artifacts: Vec<BackupArtifact> = destinations
            .iter()
            .map(|&destination_id| BackupArtifact {
                id: 0,
                run_id: run.id,
                job_id: job.id,
                destination_id,
                filename: outcome.filename.clone(),
                remote_path: outcome.remote_path.clone(),
                size_bytes: outcome.size_bytes,
                checksum_sha256: outcome.checksum_sha256.clone(),
                is_encrypted: job.encrypt,
                backup_type: job.backup_type.clone(),
                tags: job.tags.clone(),
                domain: job.domain.clone(),
                db_name: job.db_name(),
                server_name: Some(target.name.clone()),
                expires_at: None,
                is_deleted: false,
                deleted_at: None,
                created_at,
            })
            .collect();

        match self.artifact_repo.create_batch(&artifacts).await {
            Ok(created) => {
                self.metrics.record_artifacts_created(created.len());
                debug!("运行实例 {} 记录了 {} 个备份产物", run.id, created.len());
            }
            Err(e) => {
                error!("运行实例 {} 备份产物记录失败: {}", run.id, e);
                let entry = RunLogEntry::new(
                    LogLevel::Error,
                    format!("Failed to record artifacts: {e}"),
                );
                if let Err(e) = self.run_repo.append_log(run.id, &entry).await {
                    warn!("追加运行日志失败: {}", e);
                }
            }
        }
    }

    /// 配置错误导致的失败，不进入重试分支
    async fn fail_before_attempt(
        &self,
        mut run: BackupRun,
        job: Option<&BackupJob>,
        target: Option<&Target>,
        error: OrchestratorError,
    ) -> OrchestratorResult<BackupRun> {
        warn!("运行实例 {} 无法执行: {}", run.id, error);
        let message = error.to_string();
        run.log(LogLevel::Error, message.clone());
        run.error_message = Some(message);

        run.finish(RunStatus::Failed, Utc::now());
        if !self.write_terminal(&run).await? {
            return self.reload(run).await;
        }
        self.announce_with(
            &run,
            job.map(|j| j.name.as_str()),
            target,
            job.map(|j| j.backup_type.as_str()),
        )
        .await;
        Ok(run)
    }

    async fn finish(
        &self,
        mut run: BackupRun,
        job: &BackupJob,
        target: Option<&Target>,
        status: RunStatus,
    ) -> OrchestratorResult<BackupRun> {
        run.finish(status, Utc::now());
        if !self.write_terminal(&run).await? {
            return self.reload(run).await;
        }
        self.announce(&run, job, target).await;
        Ok(run)
    }

    /// 条件终态写入；被拒绝时追加一条说明日志
    async fn write_terminal(&self, run: &BackupRun) -> OrchestratorResult<bool> {
        if self.run_repo.update_if_running(run).await? {
            return Ok(true);
        }

        StructuredLogger::log_terminal_write_rejected(run.id, run.status.as_str());
        let entry = RunLogEntry::new(
            LogLevel::Warn,
            format!(
                "Attempt finished as {} after the run was cancelled; result discarded",
                run.status
            ),
        );
        self.run_repo.append_log(run.id, &entry).await?;
        Ok(false)
    }

    async fn reload(&self, run: BackupRun) -> OrchestratorResult<BackupRun> {
        Ok(self.run_repo.get_by_id(run.id).await?.unwrap_or(run))
    }

    async fn announce(&self, run: &BackupRun, job: &BackupJob, target: Option<&Target>) {
        self.announce_with(run, Some(&job.name), target, Some(&job.backup_type))
            .await;
    }

    /// 终态日志、指标与唯一的一次生命周期事件
    async fn announce_with(
        &self,
        run: &BackupRun,
        job_name: Option<&str>,
        target: Option<&Target>,
        backup_type: Option<&str>,
    ) {
        let job_name = job_name.unwrap_or_default();
        let duration = run.duration_seconds();

        StructuredLogger::log_run_finished(
            run.id,
            job_name,
            run.status.as_str(),
            run.size_bytes,
            duration,
            run.error_message.as_deref(),
        );
        self.metrics.record_run_finished(
            backup_type.unwrap_or("unknown"),
            run.status.as_str(),
            duration.unwrap_or_default(),
        );

        let Some(event) = LifecycleEvent::for_status(run.status) else {
            return;
        };
        let payload = RunEventPayload {
            run_id: run.id,
            job_name: job_name.to_string(),
            target_name: target.map(|t| t.name.clone()).unwrap_or_default(),
            size_bytes: run.size_bytes,
            error: run.error_message.clone(),
            duration_seconds: duration,
        };
        emit_event(self.notifier.as_ref(), &self.metrics, event, &payload).await;
        info!("运行实例 {} 结束，状态 {}", run.id, run.status);
    }
}

/// 发出事件；通知失败只记录日志
pub(crate) async fn emit_event<T: serde::Serialize>(
    notifier: &dyn Notifier,
    metrics: &MetricsCollector,
    event: LifecycleEvent,
    payload: &T,
) {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!("序列化事件 {} 失败: {}", event, e);
            return;
        }
    };
    if let Err(e) = notifier.emit(event, value).await {
        metrics.record_notification_failure(event.as_str());
        StructuredLogger::log_notification_failed(event.as_str(), &e.to_string());
    }
}
