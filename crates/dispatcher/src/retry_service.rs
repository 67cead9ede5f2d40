use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use orchestrator_core::{config::ExecutorConfig, models::BackupJob};

/// 重试策略配置
///
/// 第 n 次重试前等待 `n * base_interval_seconds` 秒：线性增长，没有上限，也没有随机抖动。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// 基础重试间隔（秒）
    pub base_interval_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_interval_seconds: 60,
        }
    }
}

impl From<&ExecutorConfig> for RetryConfig {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            base_interval_seconds: config.retry_base_delay_seconds,
        }
    }
}

/// 一次失败尝试之后的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待 `delay` 后以 `retry_count` 再次执行
    Retry { retry_count: i32, delay: Duration },
    /// 重试次数耗尽，运行以失败结束
    GiveUp,
}

/// 重试策略
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 第 `retry_count` 次重试之前的等待时间
    pub fn backoff(&self, retry_count: i32) -> Duration {
        let n = retry_count.max(0) as u64;
        Duration::from_secs(self.config.base_interval_seconds.saturating_mul(n))
    }

    /// 根据当前已重试次数决定下一步
    pub fn decide(&self, job: &BackupJob, retry_count: i32) -> RetryDecision {
        if job.can_retry(retry_count) {
            let next = retry_count + 1;
            let delay = self.backoff(next);
            debug!(
                "任务 {} 第 {} 次重试，等待 {} 秒",
                job.name,
                next,
                delay.as_secs()
            );
            RetryDecision::Retry {
                retry_count: next,
                delay,
            }
        } else {
            RetryDecision::GiveUp
        }
    }

    /// 等待退避时间；期间被取消时提前返回 `false`
    pub async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_retries(max_retries: i32) -> BackupJob {
        let mut job = BackupJob::new("nightly", 1, "files", "0 0 2 * * *");
        job.max_retries = max_retries;
        job
    }

    #[test]
    fn test_backoff_is_linear_and_increasing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(3), Duration::from_secs(180));
        assert!(policy.backoff(4) > policy.backoff(3));
    }

    #[test]
    fn test_decide_respects_budget() {
        let policy = RetryPolicy::new(RetryConfig {
            base_interval_seconds: 10,
        });
        let job = job_with_retries(2);

        assert_eq!(
            policy.decide(&job, 0),
            RetryDecision::Retry {
                retry_count: 1,
                delay: Duration::from_secs(10)
            }
        );
        assert_eq!(
            policy.decide(&job, 1),
            RetryDecision::Retry {
                retry_count: 2,
                delay: Duration::from_secs(20)
            }
        );
        assert_eq!(policy.decide(&job, 2), RetryDecision::GiveUp);
        assert_eq!(policy.decide(&job_with_retries(0), 0), RetryDecision::GiveUp);
    }

    #[tokio::test]
    async fn test_wait_interrupted_by_cancel() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!policy.wait(Duration::from_secs(3600), &cancel).await);
    }
}
