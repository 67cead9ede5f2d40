//! Metrics collector for the backup orchestrator
//!
//! Thin wrapper over the `metrics` facade. Without an installed recorder
//! every call is a no-op, so tests can use the collector freely.

use metrics::{counter, gauge, histogram};

/// Metrics collector for scheduling, run lifecycle and rotation
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a run created by any trigger source
    pub fn record_run_dispatched(&self, triggered_by: &str) {
        counter!("orchestrator_runs_dispatched_total", "triggered_by" => triggered_by.to_string())
            .increment(1);
    }

    /// Record a run reaching a terminal state
    pub fn record_run_finished(&self, backup_type: &str, status: &str, duration_seconds: f64) {
        counter!(
            "orchestrator_runs_finished_total",
            "backup_type" => backup_type.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!(
            "orchestrator_run_duration_seconds",
            "backup_type" => backup_type.to_string()
        )
        .record(duration_seconds);
    }

    pub fn record_run_retry(&self, backup_type: &str) {
        counter!("orchestrator_run_retries_total", "backup_type" => backup_type.to_string())
            .increment(1);
    }

    pub fn record_backup_size(&self, backup_type: &str, size_bytes: i64) {
        histogram!("orchestrator_backup_size_bytes", "backup_type" => backup_type.to_string())
            .record(size_bytes as f64);
    }

    pub fn record_artifacts_created(&self, count: usize) {
        counter!("orchestrator_artifacts_created_total").increment(count as u64);
    }

    /// Record artifacts soft-deleted by one rotation pass
    pub fn record_rotation(&self, deleted: usize, kept: usize) {
        counter!("orchestrator_rotation_runs_total").increment(1);
        counter!("orchestrator_artifacts_rotated_total").increment(deleted as u64);
        gauge!("orchestrator_artifacts_kept_last_rotation").set(kept as f64);
    }

    /// Record one scheduler scan
    pub fn record_scheduler_cycle(&self, duration_seconds: f64, dispatched: usize) {
        histogram!("orchestrator_scheduler_cycle_duration_seconds").record(duration_seconds);
        counter!("orchestrator_scheduler_cycles_total").increment(1);
        if dispatched > 0 {
            counter!("orchestrator_scheduler_fired_total").increment(dispatched as u64);
        }
    }

    pub fn update_runs_in_flight(&self, count: usize) {
        gauge!("orchestrator_runs_in_flight").set(count as f64);
    }

    pub fn record_notification_failure(&self, event: &str) {
        counter!("orchestrator_notification_failures_total", "event" => event.to_string())
            .increment(1);
    }
}
