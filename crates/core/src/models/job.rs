use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 备份任务定义
///
/// 由管理端配置维护；在编排核心看来只读（`is_active` 除外）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupJob {
    pub id: i64,
    pub name: String,
    pub target_id: i64,
    pub backup_type: String,
    pub schedule_cron: String,
    /// 备份策略自身解析的源配置，核心只读取 `db_name`
    pub source_config: serde_json::Value,
    pub destination_ids: Vec<i64>,
    pub retention_policy_id: Option<i64>,
    /// 目标存储ID -> 保留策略ID
    pub retention_overrides: HashMap<i64, i64>,
    pub max_retries: i32,
    pub timeout_seconds: Option<i64>,
    pub encrypt: bool,
    pub tags: Vec<String>,
    pub domain: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackupJob {
    pub fn new(name: &str, target_id: i64, backup_type: &str, schedule_cron: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            name: name.to_string(),
            target_id,
            backup_type: backup_type.to_string(),
            schedule_cron: schedule_cron.to_string(),
            source_config: serde_json::json!({}),
            destination_ids: Vec::new(),
            retention_policy_id: None,
            retention_overrides: HashMap::new(),
            max_retries: 0,
            timeout_seconds: None,
            encrypt: false,
            tags: Vec::new(),
            domain: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// 解析某个目标存储的有效保留策略：覆盖表优先，其次任务默认策略
    pub fn effective_policy_id(&self, destination_id: i64) -> Option<i64> {
        self.retention_overrides
            .get(&destination_id)
            .copied()
            .or(self.retention_policy_id)
    }

    pub fn db_name(&self) -> Option<String> {
        self.source_config
            .get("db_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn can_retry(&self, retry_count: i32) -> bool {
        retry_count < self.max_retries
    }
}

/// 任务查询过滤器
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub is_active: Option<bool>,
    pub backup_type: Option<String>,
    pub domain: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_policy_prefers_override() {
        let mut job = BackupJob::new("nightly", 1, "postgresql", "0 0 2 * * *");
        job.destination_ids = vec![10, 20, 30];
        job.retention_policy_id = Some(100);
        job.retention_overrides.insert(20, 200);

        assert_eq!(job.effective_policy_id(10), Some(100));
        assert_eq!(job.effective_policy_id(20), Some(200));

        job.retention_policy_id = None;
        assert_eq!(job.effective_policy_id(10), None);
        assert_eq!(job.effective_policy_id(20), Some(200));
    }

    #[test]
    fn test_db_name_from_source_config() {
        let mut job = BackupJob::new("nightly", 1, "postgresql", "0 0 2 * * *");
        assert_eq!(job.db_name(), None);
        job.source_config = serde_json::json!({"db_name": "billing", "pg_user": "postgres"});
        assert_eq!(job.db_name().as_deref(), Some("billing"));
    }

    #[test]
    fn test_can_retry() {
        let mut job = BackupJob::new("nightly", 1, "files", "0 0 2 * * *");
        job.max_retries = 2;
        assert!(job.can_retry(0));
        assert!(job.can_retry(1));
        assert!(!job.can_retry(2));
    }
}
