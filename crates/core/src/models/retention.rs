use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GFS保留策略
///
/// 单次轮换过程中作为只读快照使用。`max_age_days == 0` 表示不设年龄上限。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub id: i64,
    pub name: String,
    pub keep_hourly: u32,
    pub keep_daily: u32,
    pub keep_weekly: u32,
    pub keep_monthly: u32,
    pub keep_yearly: u32,
    pub max_age_days: u32,
}

impl RetentionPolicy {
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            keep_hourly: 0,
            keep_daily: 0,
            keep_weekly: 0,
            keep_monthly: 0,
            keep_yearly: 0,
            max_age_days: 0,
        }
    }
}

/// 年龄上限与保留集合的关系
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxAgeMode {
    /// 保留集合中的产物永不因年龄被删除
    #[default]
    KeepSetWins,
    /// 超过年龄上限的产物一律删除，即使它在保留集合中
    HardCeiling,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    Rotation,
    MaxAge,
}

impl RotationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationReason::Rotation => "rotation",
            RotationReason::MaxAge => "max_age",
        }
    }
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待删除的产物
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RotationCandidate {
    pub id: i64,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: i64,
    pub reason: RotationReason,
}

/// 轮换计划：对一个快照计算出的保留集合与删除集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotationPlan {
    pub total: usize,
    pub keep_ids: BTreeSet<i64>,
    pub to_delete: Vec<RotationCandidate>,
}

impl RotationPlan {
    pub fn delete_ids(&self) -> Vec<i64> {
        self.to_delete.iter().map(|c| c.id).collect()
    }

    pub fn would_keep(&self) -> usize {
        self.total - self.to_delete.len()
    }

    pub fn outcome(&self) -> RotationOutcome {
        RotationOutcome {
            total: self.total,
            kept: self.would_keep(),
            deleted: self.to_delete.len(),
            deleted_ids: self.delete_ids(),
        }
    }

    pub fn preview(&self) -> RotationPreview {
        RotationPreview {
            total: self.total,
            would_keep: self.would_keep(),
            would_delete: self.to_delete.len(),
            artifacts: self.to_delete.clone(),
        }
    }
}

/// 实际执行轮换后的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RotationOutcome {
    pub total: usize,
    pub kept: usize,
    pub deleted: usize,
    pub deleted_ids: Vec<i64>,
}

/// 预览模式的结果，不做任何持久化
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RotationPreview {
    pub total: usize,
    pub would_keep: usize,
    pub would_delete: usize,
    pub artifacts: Vec<RotationCandidate>,
}
