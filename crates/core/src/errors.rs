use thiserror::Error;

use crate::models::RunStatus;

/// 编排器错误类型定义
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移错误: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("备份任务未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("备份运行实例未找到: {id}")]
    RunNotFound { id: i64 },

    #[error("保留策略未找到: {id}")]
    RetentionPolicyNotFound { id: i64 },

    #[error("备份产物未找到: {id}")]
    ArtifactNotFound { id: i64 },

    #[error("备份目标未找到: {id}")]
    TargetNotFound { id: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("未知的备份类型: {0}")]
    UnknownBackupType(String),

    #[error("备份执行超时({seconds}秒)")]
    ExecutionTimeout { seconds: u64 },

    #[error("备份执行失败: {0}")]
    BackupExecution(String),

    #[error("无法取消运行实例 {id}: 当前状态为 {status}")]
    CannotCancel { id: i64, status: RunStatus },

    #[error("运行实例 {id} 状态为 {status}，不允许此操作")]
    InvalidRunState { id: i64, status: RunStatus },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// 是否属于可重试的瞬时执行错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::BackupExecution(_) | OrchestratorError::ExecutionTimeout { .. }
        )
    }

    /// 是否属于配置类错误（在边界处拒绝，不进入重试分支）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidCron { .. }
                | OrchestratorError::UnknownBackupType(_)
                | OrchestratorError::RetentionPolicyNotFound { .. }
                | OrchestratorError::Configuration(_)
        )
    }
}

/// 统一的Result类型
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(OrchestratorError::BackupExecution("io".to_string()).is_retryable());
        assert!(OrchestratorError::ExecutionTimeout { seconds: 5 }.is_retryable());
        assert!(!OrchestratorError::UnknownBackupType("ftp".to_string()).is_retryable());
        assert!(OrchestratorError::UnknownBackupType("ftp".to_string()).is_configuration());
        assert!(!OrchestratorError::RunNotFound { id: 1 }.is_configuration());
    }

    #[test]
    fn test_cannot_cancel_message() {
        let err = OrchestratorError::CannotCancel {
            id: 7,
            status: RunStatus::Success,
        };
        assert_eq!(err.to_string(), "无法取消运行实例 7: 当前状态为 success");
    }
}
