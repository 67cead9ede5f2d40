//! Structured logging utilities
//!
//! Every lifecycle event is logged with a stable `event` field so log
//! pipelines can filter on it regardless of the human readable message.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use orchestrator_core::config::ObservabilityConfig;
use tracing::{debug, error, info, warn};

/// Structured logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("Invalid log format: {other}")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread_id: false,
        }
    }
}

impl From<&ObservabilityConfig> for LoggingConfig {
    fn from(config: &ObservabilityConfig) -> Self {
        let format = config.log_format.parse().unwrap_or(LogFormat::Pretty);
        Self {
            level: config.log_level.clone(),
            format,
            include_location: format == LogFormat::Json,
            include_thread_id: false,
        }
    }
}

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a run created by the scheduler, a manual trigger or a restart
    pub fn log_run_dispatched(
        run_id: i64,
        job_id: i64,
        job_name: &str,
        triggered_by: &str,
        fire_time: Option<DateTime<Utc>>,
    ) {
        info!(
            event = "run_dispatched",
            run.id = run_id,
            job.id = job_id,
            job.name = job_name,
            run.triggered_by = triggered_by,
            run.fire_time = ?fire_time,
            "Backup run dispatched"
        );
    }

    /// Log the start of one execution attempt
    pub fn log_attempt_start(run_id: i64, job_name: &str, backup_type: &str, retry_count: i32) {
        info!(
            event = "run_attempt_start",
            run.id = run_id,
            job.name = job_name,
            job.backup_type = backup_type,
            run.retry_count = retry_count,
            "Backup attempt started"
        );
    }

    /// Log a run reaching a terminal state
    pub fn log_run_finished(
        run_id: i64,
        job_name: &str,
        status: &str,
        size_bytes: i64,
        duration_seconds: Option<f64>,
        error_message: Option<&str>,
    ) {
        match status {
            "success" | "cancelled" => info!(
                event = "run_finished",
                run.id = run_id,
                job.name = job_name,
                run.status = status,
                run.size_bytes = size_bytes,
                run.duration_seconds = duration_seconds,
                "Backup run finished"
            ),
            "partial" => warn!(
                event = "run_finished",
                run.id = run_id,
                job.name = job_name,
                run.status = status,
                run.size_bytes = size_bytes,
                run.duration_seconds = duration_seconds,
                run.error = error_message.unwrap_or(""),
                "Backup run finished with partial upload"
            ),
            _ => error!(
                event = "run_finished",
                run.id = run_id,
                job.name = job_name,
                run.status = status,
                run.duration_seconds = duration_seconds,
                run.error = error_message.unwrap_or("Unknown error"),
                "Backup run failed"
            ),
        }
    }

    /// Log a scheduled retry
    pub fn log_run_retry(
        run_id: i64,
        job_name: &str,
        retry_count: i32,
        max_retries: i32,
        delay_seconds: u64,
        reason: &str,
    ) {
        warn!(
            event = "run_retry",
            run.id = run_id,
            job.name = job_name,
            run.retry_count = retry_count,
            job.max_retries = max_retries,
            run.retry_delay_seconds = delay_seconds,
            run.retry_reason = reason,
            "Backup retry scheduled"
        );
    }

    /// Log a terminal write that lost the race against another writer
    pub fn log_terminal_write_rejected(run_id: i64, attempted_status: &str) {
        warn!(
            event = "run_terminal_write_rejected",
            run.id = run_id,
            run.attempted_status = attempted_status,
            "Run already left the running state; result discarded"
        );
    }

    /// Log a completed rotation pass over one scope
    pub fn log_rotation_completed(
        policy_name: &str,
        job_id: i64,
        destination_id: Option<i64>,
        total: usize,
        deleted: usize,
    ) {
        info!(
            event = "rotation_completed",
            policy.name = policy_name,
            job.id = job_id,
            destination.id = ?destination_id,
            rotation.total = total,
            rotation.deleted = deleted,
            "Retention rotation completed"
        );
    }

    /// Log a job skipped by the scheduler because of a malformed expression
    pub fn log_invalid_schedule(job_id: i64, job_name: &str, expression: &str, reason: &str) {
        warn!(
            event = "invalid_schedule",
            job.id = job_id,
            job.name = job_name,
            job.schedule = expression,
            schedule.error = reason,
            "Skipping job with invalid cron expression"
        );
    }

    /// Log one scheduler scan
    pub fn log_scheduler_cycle(active_jobs: usize, dispatched: usize, duration_ms: u64) {
        debug!(
            event = "scheduler_cycle",
            scheduler.active_jobs = active_jobs,
            scheduler.dispatched = dispatched,
            scheduler.duration_ms = duration_ms,
            "Scheduler scan completed"
        );
    }

    /// Log a notifier delivery failure
    pub fn log_notification_failed(event_name: &str, error: &str) {
        warn!(
            event = "notification_failed",
            notification.event = event_name,
            notification.error = error,
            "Failed to emit lifecycle event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_observability() {
        let config = ObservabilityConfig {
            log_format: "json".to_string(),
            log_level: "debug".to_string(),
            ..Default::default()
        };
        let logging = LoggingConfig::from(&config);
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "debug");
        assert!(logging.include_location);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("Compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
