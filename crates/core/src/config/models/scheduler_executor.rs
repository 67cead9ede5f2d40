use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::MaxAgeMode;

/// 触发调度器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 轮询周期，同时也是判定"刚刚到期"的窗口宽度
    pub poll_interval_seconds: u64,
    /// 工作池中同时执行的运行实例上限
    pub max_concurrent_runs: usize,
    /// 同一任务的运行实例是否串行执行
    pub exclusive_per_job: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 60,
            max_concurrent_runs: 4,
            exclusive_per_job: false,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("轮询周期必须大于0"));
        }

        if self.max_concurrent_runs == 0 {
            return Err(anyhow::anyhow!("最大并发运行数必须大于0"));
        }

        Ok(())
    }
}

/// 运行执行器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 任务未设置 `timeout_seconds` 时使用的单次尝试超时
    pub default_timeout_seconds: u64,
    /// 重试退避基数，第 n 次重试前等待 `n * retry_base_delay_seconds` 秒
    pub retry_base_delay_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 3600,
            retry_base_delay_seconds: 60,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("默认执行超时必须大于0"));
        }

        if self.retry_base_delay_seconds == 0 {
            return Err(anyhow::anyhow!("重试退避基数必须大于0"));
        }

        Ok(())
    }
}

/// 保留轮换配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RotationConfig {
    pub max_age_mode: MaxAgeMode,
}
