//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Duration, Utc};
use orchestrator_core::models::{
    BackupArtifact, BackupJob, BackupRun, RetentionPolicy, RunStatus, Target, TriggerSource,
};

/// Builder for creating test BackupJob entities
pub struct JobBuilder {
    job: BackupJob,
}

impl JobBuilder {
    pub fn new() -> Self {
        let mut job = BackupJob::new("test_job", 1, "files", "0 0 2 * * *");
        job.id = 1;
        job.destination_ids = vec![1];
        Self { job }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.name = name.to_string();
        self
    }

    pub fn with_target(mut self, target_id: i64) -> Self {
        self.job.target_id = target_id;
        self
    }

    pub fn with_backup_type(mut self, backup_type: &str) -> Self {
        self.job.backup_type = backup_type.to_string();
        self
    }

    pub fn with_schedule(mut self, schedule_cron: &str) -> Self {
        self.job.schedule_cron = schedule_cron.to_string();
        self
    }

    pub fn with_source_config(mut self, source_config: serde_json::Value) -> Self {
        self.job.source_config = source_config;
        self
    }

    pub fn with_destinations(mut self, destination_ids: Vec<i64>) -> Self {
        self.job.destination_ids = destination_ids;
        self
    }

    pub fn with_retention_policy(mut self, policy_id: i64) -> Self {
        self.job.retention_policy_id = Some(policy_id);
        self
    }

    pub fn with_retention_override(mut self, destination_id: i64, policy_id: i64) -> Self {
        self.job.retention_overrides.insert(destination_id, policy_id);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.job.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: i64) -> Self {
        self.job.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_tags(mut self, tags: Vec<&str>) -> Self {
        self.job.tags = tags.into_iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.job.domain = Some(domain.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.job.is_active = false;
        self
    }

    pub fn build(self) -> BackupJob {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test BackupRun entities
pub struct RunBuilder {
    run: BackupRun,
}

impl RunBuilder {
    pub fn new() -> Self {
        let mut run = BackupRun::new(1, 1, TriggerSource::Scheduler);
        run.id = 1;
        Self { run }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.run.id = id;
        self
    }

    pub fn with_job(mut self, job_id: i64) -> Self {
        self.run.job_id = job_id;
        self
    }

    pub fn with_target(mut self, target_id: i64) -> Self {
        self.run.target_id = target_id;
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.run.status = status;
        if status.is_terminal() && self.run.finished_at.is_none() {
            self.run.finished_at = Some(Utc::now());
        }
        self
    }

    pub fn with_trigger(mut self, triggered_by: TriggerSource) -> Self {
        self.run.triggered_by = triggered_by;
        self
    }

    pub fn with_retry_count(mut self, retry_count: i32) -> Self {
        self.run.retry_count = retry_count;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.run.created_at = created_at;
        self.run.started_at = Some(created_at);
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.run.error_message = Some(error.to_string());
        self
    }

    pub fn build(self) -> BackupRun {
        self.run
    }
}

impl Default for RunBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test BackupArtifact entities
pub struct ArtifactBuilder {
    artifact: BackupArtifact,
}

impl ArtifactBuilder {
    pub fn new() -> Self {
        Self {
            artifact: BackupArtifact {
                id: 1,
                run_id: 1,
                job_id: 1,
                destination_id: 1,
                filename: "backup.tar.gz".to_string(),
                remote_path: "/backups/backup.tar.gz".to_string(),
                size_bytes: 1024,
                checksum_sha256: "00".repeat(32),
                is_encrypted: false,
                backup_type: "files".to_string(),
                tags: Vec::new(),
                domain: None,
                db_name: None,
                server_name: None,
                expires_at: None,
                is_deleted: false,
                deleted_at: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.artifact.id = id;
        self.artifact.filename = format!("backup-{id}.tar.gz");
        self.artifact.remote_path = format!("/backups/backup-{id}.tar.gz");
        self
    }

    pub fn with_run(mut self, run_id: i64) -> Self {
        self.artifact.run_id = run_id;
        self
    }

    pub fn with_job(mut self, job_id: i64) -> Self {
        self.artifact.job_id = job_id;
        self
    }

    pub fn with_destination(mut self, destination_id: i64) -> Self {
        self.artifact.destination_id = destination_id;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.artifact.created_at = created_at;
        self
    }

    /// `created_at = now - age`
    pub fn aged(mut self, now: DateTime<Utc>, age: Duration) -> Self {
        self.artifact.created_at = now - age;
        self
    }

    pub fn with_size(mut self, size_bytes: i64) -> Self {
        self.artifact.size_bytes = size_bytes;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.artifact.is_deleted = true;
        self.artifact.deleted_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> BackupArtifact {
        self.artifact
    }
}

impl Default for ArtifactBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test RetentionPolicy entities
pub struct PolicyBuilder {
    policy: RetentionPolicy,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        let mut policy = RetentionPolicy::new("test_policy");
        policy.id = 1;
        Self { policy }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.policy.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.policy.name = name.to_string();
        self
    }

    pub fn hourly(mut self, keep: u32) -> Self {
        self.policy.keep_hourly = keep;
        self
    }

    pub fn daily(mut self, keep: u32) -> Self {
        self.policy.keep_daily = keep;
        self
    }

    pub fn weekly(mut self, keep: u32) -> Self {
        self.policy.keep_weekly = keep;
        self
    }

    pub fn monthly(mut self, keep: u32) -> Self {
        self.policy.keep_monthly = keep;
        self
    }

    pub fn yearly(mut self, keep: u32) -> Self {
        self.policy.keep_yearly = keep;
        self
    }

    pub fn max_age_days(mut self, days: u32) -> Self {
        self.policy.max_age_days = days;
        self
    }

    pub fn build(self) -> RetentionPolicy {
        self.policy
    }
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Target entities
pub struct TargetBuilder {
    target: Target,
}

impl TargetBuilder {
    pub fn new() -> Self {
        let mut target = Target::new("test_target", "10.0.0.1");
        target.id = 1;
        Self { target }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.target.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.target.name = name.to_string();
        self
    }

    pub fn build(self) -> Target {
        self.target
    }
}

impl Default for TargetBuilder {
    fn default() -> Self {
        Self::new()
    }
}
