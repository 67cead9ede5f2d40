//! 备份策略接口
//!
//! 备份策略负责"如何"对某一类备份（`postgresql`、`docker_volumes`、`files`、
//! `custom` …）真正执行一次备份。编排核心只关心结果：成功时的文件名、远端路径、
//! 大小与校验和，失败时的错误信息。
//!
//! 策略必须可以安全地重复调用：重试会以相同的运行实例再次进入 `execute`，
//! 上一次尝试不能留下破坏下一次尝试的中间状态。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    models::{BackupJob, RunLogEntry, Target},
    OrchestratorResult,
};

/// 一次备份尝试的执行上下文
#[derive(Debug, Clone)]
pub struct BackupContext {
    pub run_id: i64,
    /// 当前尝试对应的重试次数，首次执行为0
    pub retry_count: i32,
    pub job: BackupJob,
    pub target: Target,
}

/// 备份策略返回的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackupOutcome {
    pub success: bool,
    pub filename: String,
    pub remote_path: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub logs: Vec<RunLogEntry>,
    pub error: Option<String>,
    /// 上传失败的目标存储；非空但未覆盖全部目标时运行以 `partial` 结束
    #[serde(default)]
    pub failed_destinations: Vec<i64>,
}

impl BackupOutcome {
    pub fn success(
        filename: impl Into<String>,
        remote_path: impl Into<String>,
        size_bytes: i64,
        checksum_sha256: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            filename: filename.into(),
            remote_path: remote_path.into(),
            size_bytes,
            checksum_sha256: checksum_sha256.into(),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_logs(mut self, logs: Vec<RunLogEntry>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_failed_destinations(mut self, destinations: Vec<i64>) -> Self {
        self.failed_destinations = destinations;
        self
    }
}

/// 备份策略
///
/// 取消是协作式的：`cancel` 被触发后策略应尽快清理并返回，编排核心不会强行中断。
#[async_trait]
pub trait BackupStrategy: Send + Sync {
    /// 策略名称，用于日志
    fn name(&self) -> &str;

    /// 执行一次备份尝试
    ///
    /// 返回 `Err` 视为瞬时执行错误，与 `success == false` 一样进入重试分支。
    async fn execute(
        &self,
        context: &BackupContext,
        cancel: CancellationToken,
    ) -> OrchestratorResult<BackupOutcome>;
}
