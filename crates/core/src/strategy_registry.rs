use std::collections::HashMap;
use std::sync::Arc;

use crate::{traits::BackupStrategy, OrchestratorError, OrchestratorResult};

/// 备份类型 -> 备份策略的能力表
///
/// 在启动时构建，之后以 `Arc` 注入运行执行器；不存在全局注册表。
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn BackupStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backup_type: &str, strategy: Arc<dyn BackupStrategy>) {
        self.strategies.insert(backup_type.to_string(), strategy);
    }

    pub fn with_strategy(mut self, backup_type: &str, strategy: Arc<dyn BackupStrategy>) -> Self {
        self.register(backup_type, strategy);
        self
    }

    pub fn register_batch(&mut self, strategies: Vec<(String, Arc<dyn BackupStrategy>)>) {
        for (backup_type, strategy) in strategies {
            self.strategies.insert(backup_type, strategy);
        }
    }

    pub fn get(&self, backup_type: &str) -> Option<Arc<dyn BackupStrategy>> {
        self.strategies.get(backup_type).cloned()
    }

    /// 查找策略，未注册的备份类型属于配置错误
    pub fn resolve(&self, backup_type: &str) -> OrchestratorResult<Arc<dyn BackupStrategy>> {
        self.get(backup_type)
            .ok_or_else(|| OrchestratorError::UnknownBackupType(backup_type.to_string()))
    }

    pub fn contains(&self, backup_type: &str) -> bool {
        self.strategies.contains_key(backup_type)
    }

    pub fn backup_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.strategies.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("backup_types", &self.backup_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{BackupContext, BackupOutcome};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct NoopStrategy;

    #[async_trait]
    impl BackupStrategy for NoopStrategy {
        fn name(&self) -> &str {
            "noop"
        }

        async fn execute(
            &self,
            _context: &BackupContext,
            _cancel: CancellationToken,
        ) -> OrchestratorResult<BackupOutcome> {
            Ok(BackupOutcome::success("f", "/f", 1, "00"))
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = StrategyRegistry::new()
            .with_strategy("files", Arc::new(NoopStrategy))
            .with_strategy("custom", Arc::new(NoopStrategy));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("files"));
        assert_eq!(registry.backup_types(), vec!["custom", "files"]);
        assert_eq!(registry.resolve("files").unwrap().name(), "noop");
    }

    #[test]
    fn test_unknown_backup_type() {
        let registry = StrategyRegistry::new();
        assert!(registry.is_empty());
        match registry.resolve("mysql") {
            Err(OrchestratorError::UnknownBackupType(t)) => assert_eq!(t, "mysql"),
            other => panic!("unexpected: {:?}", other.map(|s| s.name().to_string())),
        }
    }
}
