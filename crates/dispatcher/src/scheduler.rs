use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use orchestrator_core::{
    config::SchedulerConfig,
    models::{BackupJob, BackupRun, TriggerSource},
    traits::{JobRepository, RunRepository},
    OrchestratorResult,
};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::cron_utils::CronScheduler;
use crate::worker_pool::WorkerPool;

/// 触发调度器
///
/// 每个轮询周期扫描一次启用的任务。最近一次触发时间距今不足一个周期即视为到期，
/// 然后以触发时间为窗口起点在台账中做原子的检查后插入。多个调度实例、重叠的周期
/// 都只会为同一窗口创建一个运行实例。周期之间不保留任何内存状态。
pub struct BackupScheduler {
    job_repo: Arc<dyn JobRepository>,
    run_repo: Arc<dyn RunRepository>,
    pool: Arc<WorkerPool>,
    config: SchedulerConfig,
    metrics: MetricsCollector,
}

impl BackupScheduler {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        run_repo: Arc<dyn RunRepository>,
        pool: Arc<WorkerPool>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            job_repo,
            run_repo,
            pool,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::seconds(self.config.poll_interval_seconds as i64)
    }

    /// 扫描一次并分派到期的任务，返回本周期创建的运行实例
    ///
    /// 单个任务出错（表达式无效、台账写入失败）只跳过该任务。
    pub async fn scan_and_dispatch(&self, now: DateTime<Utc>) -> OrchestratorResult<Vec<BackupRun>> {
        let start = Instant::now();
        let jobs = self.job_repo.get_active_jobs().await?;
        let mut dispatched = Vec::new();

        for job in &jobs {
            match self.dispatch_if_due(job, now).await {
                Ok(Some(run)) => dispatched.push(run),
                Ok(None) => {}
                Err(e) => error!("任务 {} 调度失败: {}", job.name, e),
            }
        }

        let elapsed = start.elapsed();
        self.metrics
            .record_scheduler_cycle(elapsed.as_secs_f64(), dispatched.len());
        StructuredLogger::log_scheduler_cycle(
            jobs.len(),
            dispatched.len(),
            elapsed.as_millis() as u64,
        );
        Ok(dispatched)
    }

    async fn dispatch_if_due(
        &self,
        job: &BackupJob,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Option<BackupRun>> {
        let cron = match CronScheduler::new(&job.schedule_cron) {
            Ok(cron) => cron,
            Err(e) => {
                StructuredLogger::log_invalid_schedule(
                    job.id,
                    &job.name,
                    &job.schedule_cron,
                    &e.to_string(),
                );
                return Ok(None);
            }
        };

        let Some(fire_time) = cron.due_fire_time(now, self.poll_interval()) else {
            return Ok(None);
        };

        let mut run = BackupRun::new(job.id, job.target_id, TriggerSource::Scheduler);
        run.created_at = now;
        run.started_at = Some(now);

        let Some(run) = self.run_repo.create_if_absent_since(&run, fire_time).await? else {
            debug!("任务 {} 在窗口 {} 内已有运行实例，跳过", job.name, fire_time);
            return Ok(None);
        };

        StructuredLogger::log_run_dispatched(
            run.id,
            job.id,
            &job.name,
            run.triggered_by.as_str(),
            Some(fire_time),
        );
        self.metrics.record_run_dispatched(run.triggered_by.as_str());
        self.pool.submit(run.clone())?;
        Ok(Some(run))
    }

    /// 调度主循环，收到关闭信号后返回；已分派的运行实例由工作池继续执行
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("触发调度器已禁用");
            let _ = shutdown_rx.recv().await;
            return;
        }

        info!(
            "触发调度器启动，轮询周期 {} 秒",
            self.config.poll_interval_seconds
        );
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.poll_interval_seconds,
        ));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.scan_and_dispatch(Utc::now()).await {
                        warn!("调度扫描失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("触发调度器收到关闭信号");
                    break;
                }
            }
        }
    }
}
