use async_trait::async_trait;
use orchestrator_core::{
    traits::{LifecycleEvent, Notifier},
    OrchestratorResult,
};
use tracing::info;

/// 把生命周期事件写入结构化日志的通知器
///
/// webhook 与聊天机器人投递不在编排核心内实现，部署方可替换为自己的 [`Notifier`]。
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn emit(
        &self,
        event: LifecycleEvent,
        payload: serde_json::Value,
    ) -> OrchestratorResult<()> {
        info!(
            event = "lifecycle_event",
            lifecycle.event = event.as_str(),
            lifecycle.payload = %payload,
            "Lifecycle event emitted"
        );
        Ok(())
    }
}
