use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{models::RunStatus, OrchestratorResult};

/// 生命周期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    #[serde(rename = "run.success")]
    RunSuccess,
    #[serde(rename = "run.failed")]
    RunFailed,
    #[serde(rename = "run.partial")]
    RunPartial,
    #[serde(rename = "run.cancelled")]
    RunCancelled,
    #[serde(rename = "rotation.completed")]
    RotationCompleted,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::RunSuccess => "run.success",
            LifecycleEvent::RunFailed => "run.failed",
            LifecycleEvent::RunPartial => "run.partial",
            LifecycleEvent::RunCancelled => "run.cancelled",
            LifecycleEvent::RotationCompleted => "rotation.completed",
        }
    }

    /// 终态对应的运行事件
    pub fn for_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Success => Some(LifecycleEvent::RunSuccess),
            RunStatus::Failed => Some(LifecycleEvent::RunFailed),
            RunStatus::Partial => Some(LifecycleEvent::RunPartial),
            RunStatus::Cancelled => Some(LifecycleEvent::RunCancelled),
            RunStatus::Pending | RunStatus::Running => None,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运行终态事件的负载
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEventPayload {
    pub run_id: i64,
    pub job_name: String,
    pub target_name: String,
    pub size_bytes: i64,
    pub error: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// 轮换完成事件的负载
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RotationEventPayload {
    pub policy_name: String,
    /// 只处理单个任务时为该任务ID
    pub job_id: Option<i64>,
    pub kept: usize,
    pub deleted: usize,
}

/// 通知器
///
/// 对核心而言是"发出即忘"：投递失败只记录日志，绝不影响运行结果。
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, event: LifecycleEvent, payload: serde_json::Value)
        -> OrchestratorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_for_status() {
        assert_eq!(
            LifecycleEvent::for_status(RunStatus::Partial),
            Some(LifecycleEvent::RunPartial)
        );
        assert_eq!(LifecycleEvent::for_status(RunStatus::Running), None);
        assert_eq!(LifecycleEvent::RunCancelled.to_string(), "run.cancelled");
        assert_eq!(
            serde_json::to_string(&LifecycleEvent::RotationCompleted).unwrap(),
            "\"rotation.completed\""
        );
    }
}
