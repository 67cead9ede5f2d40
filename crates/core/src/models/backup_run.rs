use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 备份运行实例
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupRun {
    pub id: i64,
    pub job_id: i64,
    pub target_id: i64,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub size_bytes: i64,
    pub log_lines: Vec<RunLogEntry>,
    pub error_message: Option<String>,
    pub triggered_by: TriggerSource,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// 运行状态
///
/// `Running` 是分派之后唯一的非终态；`Pending` 仅在分派前短暂存在。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Partial,
    Cancelled,
}

/// 触发来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Scheduler,
    Manual,
    Retry,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// 运行日志条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLogEntry {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(rename = "msg")]
    pub message: String,
}

impl RunLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Partial => "partial",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Partial | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "partial" => Ok(RunStatus::Partial),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(format!("Invalid run status: {s}")),
        }
    }
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Scheduler => "scheduler",
            TriggerSource::Manual => "manual",
            TriggerSource::Retry => "retry",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduler" => Ok(TriggerSource::Scheduler),
            "manual" => Ok(TriggerSource::Manual),
            "retry" => Ok(TriggerSource::Retry),
            _ => Err(format!("Invalid trigger source: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for RunStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RunStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(s.parse::<RunStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RunStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Sqlite> for TriggerSource {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TriggerSource {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(s.parse::<TriggerSource>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TriggerSource {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl BackupRun {
    /// 创建一个已分派（`Running`）的运行实例
    pub fn new(job_id: i64, target_id: i64, triggered_by: TriggerSource) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            job_id,
            target_id,
            status: RunStatus::Running,
            started_at: Some(now),
            finished_at: None,
            size_bytes: 0,
            log_lines: Vec::new(),
            error_message: None,
            triggered_by,
            retry_count: 0,
            created_at: now,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log_lines.push(RunLogEntry::new(level, message));
    }

    /// 设置终态并记录完成时间
    pub fn finish(&mut self, status: RunStatus, at: DateTime<Utc>) {
        self.status = status;
        if self.finished_at.is_none() {
            self.finished_at = Some(at);
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => {
                Some((finished - started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

/// 运行实例查询过滤器
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub job_id: Option<i64>,
    pub target_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
