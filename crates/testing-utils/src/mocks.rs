//! Mock implementations for all repository, notifier and strategy traits
//!
//! These are in-memory implementations that can be used for unit testing
//! without a database. The atomic ledger operations (`create_if_absent_since`,
//! `update_if_running`, `cancel_if_running`, `rotate_scope`) run entirely under
//! one lock, so they behave like their SQL counterparts under concurrency.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_core::models::{
    ArtifactScope, BackupArtifact, BackupJob, BackupRun, JobFilter, RetentionPolicy,
    RotationPlan, RunFilter, RunLogEntry, RunStatus, Target,
};
use orchestrator_core::traits::{
    ArtifactRepository, BackupContext, BackupOutcome, BackupStrategy, JobRepository,
    LifecycleEvent, Notifier, RetentionPolicyRepository, RotationPlanner, RunRepository,
    TargetRepository,
};
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use tokio_util::sync::CancellationToken;

/// Mock implementation of JobRepository for testing
#[derive(Debug, Clone)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<i64, BackupJob>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn with_jobs(jobs: Vec<BackupJob>) -> Self {
        let max_id = jobs.iter().map(|j| j.id).max().unwrap_or(0);
        let job_map = jobs.into_iter().map(|j| (j.id, j)).collect();

        Self {
            jobs: Arc::new(Mutex::new(job_map)),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl Default for MockJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &BackupJob) -> OrchestratorResult<BackupJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_job = job.clone();
        new_job.id = *next_id;
        *next_id += 1;

        jobs.insert(new_job.id, new_job.clone());
        Ok(new_job)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, job: &BackupJob) -> OrchestratorResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(OrchestratorError::JobNotFound { id: job.id });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn list(&self, filter: &JobFilter) -> OrchestratorResult<Vec<BackupJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut result: Vec<BackupJob> = jobs
            .values()
            .filter(|j| filter.is_active.map_or(true, |a| j.is_active == a))
            .filter(|j| {
                filter
                    .backup_type
                    .as_ref()
                    .map_or(true, |t| &j.backup_type == t)
            })
            .filter(|j| filter.domain.as_ref().map_or(true, |d| j.domain.as_ref() == Some(d)))
            .cloned()
            .collect();
        result.sort_by_key(|j| j.id);
        Ok(result)
    }

    async fn get_active_jobs(&self) -> OrchestratorResult<Vec<BackupJob>> {
        self.list(&JobFilter {
            is_active: Some(true),
            ..Default::default()
        })
        .await
    }

    async fn set_active(&self, id: i64, is_active: bool) -> OrchestratorResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&id)
            .ok_or(OrchestratorError::JobNotFound { id })?;
        job.is_active = is_active;
        job.updated_at = Utc::now();
        Ok(())
    }
}

/// Mock implementation of RunRepository for testing
#[derive(Debug, Clone)]
pub struct MockRunRepository {
    runs: Arc<Mutex<HashMap<i64, BackupRun>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockRunRepository {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn with_runs(runs: Vec<BackupRun>) -> Self {
        let max_id = runs.iter().map(|r| r.id).max().unwrap_or(0);
        let run_map = runs.into_iter().map(|r| (r.id, r)).collect();

        Self {
            runs: Arc::new(Mutex::new(run_map)),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    pub fn count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn get_all_runs(&self) -> Vec<BackupRun> {
        let mut runs: Vec<BackupRun> = self.runs.lock().unwrap().values().cloned().collect();
        runs.sort_by_key(|r| r.id);
        runs
    }

    pub fn runs_for_job(&self, job_id: i64) -> Vec<BackupRun> {
        self.get_all_runs()
            .into_iter()
            .filter(|r| r.job_id == job_id)
            .collect()
    }

    fn insert_locked(&self, runs: &mut HashMap<i64, BackupRun>, run: &BackupRun) -> BackupRun {
        let mut next_id = self.next_id.lock().unwrap();
        let mut new_run = run.clone();
        new_run.id = *next_id;
        *next_id += 1;
        runs.insert(new_run.id, new_run.clone());
        new_run
    }
}

impl Default for MockRunRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunRepository for MockRunRepository {
    async fn create(&self, run: &BackupRun) -> OrchestratorResult<BackupRun> {
        let mut runs = self.runs.lock().unwrap();
        Ok(self.insert_locked(&mut runs, run))
    }

    async fn create_if_absent_since(
        &self,
        run: &BackupRun,
        window_start: DateTime<Utc>,
    ) -> OrchestratorResult<Option<BackupRun>> {
        let mut runs = self.runs.lock().unwrap();
        let exists = runs
            .values()
            .any(|r| r.job_id == run.job_id && r.created_at >= window_start);
        if exists {
            return Ok(None);
        }
        Ok(Some(self.insert_locked(&mut runs, run)))
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupRun>> {
        Ok(self.runs.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, filter: &RunFilter) -> OrchestratorResult<Vec<BackupRun>> {
        let runs = self.runs.lock().unwrap();
        let mut result: Vec<BackupRun> = runs
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.job_id.map_or(true, |id| r.job_id == id))
            .filter(|r| filter.target_id.map_or(true, |id| r.target_id == id))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(result.into_iter().skip(offset).take(limit).collect())
    }

    async fn exists_since(&self, job_id: i64, since: DateTime<Utc>) -> OrchestratorResult<bool> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .any(|r| r.job_id == job_id && r.created_at >= since))
    }

    async fn update_if_running(&self, run: &BackupRun) -> OrchestratorResult<bool> {
        let mut runs = self.runs.lock().unwrap();
        match runs.get_mut(&run.id) {
            Some(stored) if stored.status == RunStatus::Running => {
                stored.status = run.status;
                stored.started_at = run.started_at;
                stored.finished_at = run.finished_at;
                stored.size_bytes = run.size_bytes;
                stored.log_lines = run.log_lines.clone();
                stored.error_message = run.error_message.clone();
                stored.retry_count = run.retry_count;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(OrchestratorError::RunNotFound { id: run.id }),
        }
    }

    async fn cancel_if_running(
        &self,
        id: i64,
        at: DateTime<Utc>,
        entry: &RunLogEntry,
    ) -> OrchestratorResult<bool> {
        let mut runs = self.runs.lock().unwrap();
        match runs.get_mut(&id) {
            Some(stored) if stored.status == RunStatus::Running => {
                stored.status = RunStatus::Cancelled;
                stored.finished_at = Some(at);
                stored.log_lines.push(entry.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(OrchestratorError::RunNotFound { id }),
        }
    }

    async fn append_log(&self, id: i64, entry: &RunLogEntry) -> OrchestratorResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let stored = runs
            .get_mut(&id)
            .ok_or(OrchestratorError::RunNotFound { id })?;
        stored.log_lines.push(entry.clone());
        Ok(())
    }
}

/// Mock implementation of ArtifactRepository for testing
#[derive(Debug, Clone)]
pub struct MockArtifactRepository {
    artifacts: Arc<Mutex<HashMap<i64, BackupArtifact>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockArtifactRepository {
    pub fn new() -> Self {
        Self {
            artifacts: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Seed artifacts keeping their ids, e.g. from [`crate::ArtifactBuilder`]
    pub fn with_artifacts(artifacts: Vec<BackupArtifact>) -> Self {
        let max_id = artifacts.iter().map(|a| a.id).max().unwrap_or(0);
        let map = artifacts.into_iter().map(|a| (a.id, a)).collect();

        Self {
            artifacts: Arc::new(Mutex::new(map)),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    pub fn get_all_artifacts(&self) -> Vec<BackupArtifact> {
        let mut artifacts: Vec<BackupArtifact> =
            self.artifacts.lock().unwrap().values().cloned().collect();
        artifacts.sort_by_key(|a| a.id);
        artifacts
    }

    pub fn non_deleted_count(&self) -> usize {
        self.artifacts
            .lock()
            .unwrap()
            .values()
            .filter(|a| !a.is_deleted)
            .count()
    }

    fn snapshot(map: &HashMap<i64, BackupArtifact>, scope: &ArtifactScope) -> Vec<BackupArtifact> {
        let mut snapshot: Vec<BackupArtifact> = map
            .values()
            .filter(|a| !a.is_deleted && scope.contains(a))
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        snapshot
    }

    fn mark_locked(map: &mut HashMap<i64, BackupArtifact>, ids: &[i64], at: DateTime<Utc>) -> u64 {
        let mut marked = 0;
        for id in ids {
            if let Some(artifact) = map.get_mut(id) {
                if !artifact.is_deleted {
                    artifact.is_deleted = true;
                    artifact.deleted_at = Some(at);
                    marked += 1;
                }
            }
        }
        marked
    }
}

impl Default for MockArtifactRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactRepository for MockArtifactRepository {
    async fn create_batch(
        &self,
        artifacts: &[BackupArtifact],
    ) -> OrchestratorResult<Vec<BackupArtifact>> {
        let mut map = self.artifacts.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let mut new_artifact = artifact.clone();
            new_artifact.id = *next_id;
            *next_id += 1;
            map.insert(new_artifact.id, new_artifact.clone());
            created.push(new_artifact);
        }
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupArtifact>> {
        Ok(self.artifacts.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_run(&self, run_id: i64) -> OrchestratorResult<Vec<BackupArtifact>> {
        let map = self.artifacts.lock().unwrap();
        let mut result: Vec<BackupArtifact> =
            map.values().filter(|a| a.run_id == run_id).cloned().collect();
        result.sort_by_key(|a| a.id);
        Ok(result)
    }

    async fn list_non_deleted(
        &self,
        scope: &ArtifactScope,
    ) -> OrchestratorResult<Vec<BackupArtifact>> {
        let map = self.artifacts.lock().unwrap();
        Ok(Self::snapshot(&map, scope))
    }

    async fn mark_deleted(&self, ids: &[i64], at: DateTime<Utc>) -> OrchestratorResult<u64> {
        let mut map = self.artifacts.lock().unwrap();
        Ok(Self::mark_locked(&mut map, ids, at))
    }

    async fn rotate_scope(
        &self,
        scope: &ArtifactScope,
        planner: &RotationPlanner<'_>,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<RotationPlan> {
        let mut map = self.artifacts.lock().unwrap();
        let snapshot = Self::snapshot(&map, scope);
        let plan = planner(&snapshot);
        Self::mark_locked(&mut map, &plan.delete_ids(), at);
        Ok(plan)
    }
}

/// Mock implementation of RetentionPolicyRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockRetentionPolicyRepository {
    policies: Arc<Mutex<HashMap<i64, RetentionPolicy>>>,
}

impl MockRetentionPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: Vec<RetentionPolicy>) -> Self {
        Self {
            policies: Arc::new(Mutex::new(policies.into_iter().map(|p| (p.id, p)).collect())),
        }
    }
}

#[async_trait]
impl RetentionPolicyRepository for MockRetentionPolicyRepository {
    async fn create(&self, policy: &RetentionPolicy) -> OrchestratorResult<RetentionPolicy> {
        let mut policies = self.policies.lock().unwrap();
        let mut new_policy = policy.clone();
        new_policy.id = policies.keys().max().copied().unwrap_or(0) + 1;
        policies.insert(new_policy.id, new_policy.clone());
        Ok(new_policy)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<RetentionPolicy>> {
        Ok(self.policies.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self) -> OrchestratorResult<Vec<RetentionPolicy>> {
        let mut result: Vec<RetentionPolicy> =
            self.policies.lock().unwrap().values().cloned().collect();
        result.sort_by_key(|p| p.id);
        Ok(result)
    }
}

/// Mock implementation of TargetRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockTargetRepository {
    targets: Arc<Mutex<HashMap<i64, Target>>>,
}

impl MockTargetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: Vec<Target>) -> Self {
        Self {
            targets: Arc::new(Mutex::new(targets.into_iter().map(|t| (t.id, t)).collect())),
        }
    }
}

#[async_trait]
impl TargetRepository for MockTargetRepository {
    async fn create(&self, target: &Target) -> OrchestratorResult<Target> {
        let mut targets = self.targets.lock().unwrap();
        let mut new_target = target.clone();
        new_target.id = targets.keys().max().copied().unwrap_or(0) + 1;
        targets.insert(new_target.id, new_target.clone());
        Ok(new_target)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Target>> {
        Ok(self.targets.lock().unwrap().get(&id).cloned())
    }
}

/// Notifier that records every emitted event
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<(LifecycleEvent, serde_json::Value)>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records the event and then reports a delivery failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<(LifecycleEvent, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .count()
    }

    pub fn total(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn emit(
        &self,
        event: LifecycleEvent,
        payload: serde_json::Value,
    ) -> OrchestratorResult<()> {
        self.events.lock().unwrap().push((event, payload));
        if self.fail {
            return Err(OrchestratorError::Notification("webhook unreachable".to_string()));
        }
        Ok(())
    }
}

/// One scripted response of [`ScriptedStrategy`]
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    Outcome(BackupOutcome),
    Error(String),
    /// Reject the job's source configuration
    Misconfigured(String),
    /// Sleep before answering, honouring cancellation
    Delayed(Duration, BackupOutcome),
    /// Block until cancelled, then report failure
    HangUntilCancelled,
}

/// Backup strategy replaying a queue of scripted responses
///
/// Once the script is exhausted every attempt succeeds.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStrategy {
    script: Arc<Mutex<VecDeque<ScriptedAttempt>>>,
    calls: Arc<AtomicUsize>,
    contexts: Arc<Mutex<Vec<BackupContext>>>,
}

impl ScriptedStrategy {
    pub fn new(script: Vec<ScriptedAttempt>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Default::default()
        }
    }

    pub fn always_succeeding() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Retry counts observed by each attempt, in call order
    pub fn observed_retry_counts(&self) -> Vec<i32> {
        self.contexts
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.retry_count)
            .collect()
    }

    pub fn default_outcome(run_id: i64) -> BackupOutcome {
        BackupOutcome::success(
            format!("run-{run_id}.tar.gz"),
            format!("/backups/run-{run_id}.tar.gz"),
            1024,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
    }
}

#[async_trait]
impl BackupStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        context: &BackupContext,
        cancel: CancellationToken,
    ) -> OrchestratorResult<BackupOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            None => Ok(Self::default_outcome(context.run_id)),
            Some(ScriptedAttempt::Outcome(outcome)) => Ok(outcome),
            Some(ScriptedAttempt::Error(message)) => {
                Err(OrchestratorError::BackupExecution(message))
            }
            Some(ScriptedAttempt::Misconfigured(message)) => {
                Err(OrchestratorError::Configuration(message))
            }
            Some(ScriptedAttempt::Delayed(delay, outcome)) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(outcome),
                    _ = cancel.cancelled() => Ok(BackupOutcome::failure("cancelled")),
                }
            }
            Some(ScriptedAttempt::HangUntilCancelled) => {
                cancel.cancelled().await;
                Ok(BackupOutcome::failure("cancelled"))
            }
        }
    }
}
