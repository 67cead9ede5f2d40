use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use orchestrator_core::{models::BackupRun, OrchestratorError, OrchestratorResult};

use crate::keyed_lock::KeyedLock;
use crate::run_executor::RunExecutor;

/// 有界的运行实例工作池
///
/// 调度循环与手动触发都把运行实例交给这里，不在调用方的任务里执行。
/// 并发上限由信号量控制；`exclusive_per_job` 开启时同一任务的运行实例依次执行。
pub struct WorkerPool {
    executor: Arc<RunExecutor>,
    permits: Arc<Semaphore>,
    job_locks: Option<Arc<KeyedLock<i64>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(executor: Arc<RunExecutor>, max_concurrent_runs: usize, exclusive_per_job: bool) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            job_locks: exclusive_per_job.then(|| Arc::new(KeyedLock::new())),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn executor(&self) -> &Arc<RunExecutor> {
        &self.executor
    }

    /// 当前空闲的执行槽位
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// 提交一个已写入台账的运行实例，立即返回
    pub fn submit(&self, run: BackupRun) -> OrchestratorResult<()> {
        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        let job_locks = self.job_locks.clone();
        let run_id = run.id;
        let job_id = run.job_id;

        let handle = tokio::spawn(async move {
            // 先按任务串行，再占用全局槽位，避免排队的同任务实例占住槽位
            let _job_guard = match &job_locks {
                Some(locks) => match locks.lock(job_id).await {
                    Ok(guard) => Some(guard),
                    Err(e) => {
                        error!("运行实例 {} 获取任务锁失败: {}", run_id, e);
                        return;
                    }
                },
                None => None,
            };
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("运行实例 {} 获取执行槽位失败: {}", run_id, e);
                    return;
                }
            };

            debug!("运行实例 {} 开始执行", run_id);
            if let Err(e) = executor.execute(run).await {
                warn!("运行实例 {} 执行结束时出错: {}", run_id, e);
            }
        });

        let mut handles = self
            .handles
            .lock()
            .map_err(|e| OrchestratorError::Internal(format!("工作池句柄锁已损坏: {e}")))?;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// 正在执行或排队中的运行实例数
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or_default()
    }

    /// 等待所有已提交的运行实例结束
    pub async fn drain(&self) {
        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!("运行实例任务异常退出: {}", e);
            }
        }
    }
}
