mod common;

use std::time::Duration;

use chrono::Utc;
use orchestrator_core::{
    models::{ArtifactScope, RunStatus},
    traits::{ArtifactRepository, BackupOutcome, LifecycleEvent, RunRepository},
};
use orchestrator_testing_utils::{
    ArtifactBuilder, JobBuilder, PolicyBuilder, ScriptedAttempt, ScriptedStrategy,
};

use common::HarnessBuilder;

fn failure(message: &str) -> ScriptedAttempt {
    ScriptedAttempt::Outcome(BackupOutcome::failure(message))
}

#[tokio::test]
async fn test_successful_run_records_artifacts_and_event() {
    let job = JobBuilder::new()
        .with_name("nightly-db")
        .with_destinations(vec![1, 2])
        .with_source_config(serde_json::json!({"db_name": "orders"}))
        .build();
    let harness = HarnessBuilder::new().jobs(vec![job.clone()]).build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run.clone()).await.unwrap();

    assert_eq!(finished.status, RunStatus::Success);
    assert_eq!(finished.size_bytes, 1024);
    assert!(finished.finished_at.is_some());
    assert_eq!(finished.retry_count, 0);

    let stored = harness.runs.get_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Success);

    let artifacts = harness.artifacts.list_by_run(run.id).await.unwrap();
    assert_eq!(artifacts.len(), 2);
    let destinations: Vec<i64> = artifacts.iter().map(|a| a.destination_id).collect();
    assert_eq!(destinations, vec![1, 2]);
    assert!(artifacts
        .iter()
        .all(|a| a.db_name.as_deref() == Some("orders")));
    assert!(artifacts
        .iter()
        .all(|a| a.server_name.as_deref() == Some("db-01")));

    let events = harness.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, LifecycleEvent::RunSuccess);
    assert_eq!(events[0].1["job_name"], "nightly-db");
    assert_eq!(events[0].1["target_name"], "db-01");
    assert_eq!(events[0].1["size_bytes"], 1024);
}

#[tokio::test(start_paused = true)]
async fn test_retries_reuse_run_with_linear_backoff() {
    let job = JobBuilder::new().with_max_retries(3).build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![
            ScriptedAttempt::Error("connection reset".to_string()),
            failure("disk full"),
        ])
        .build();
    let run = harness.create_run(&job).await;

    let start = tokio::time::Instant::now();
    let finished = harness.executor.execute(run.clone()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(finished.status, RunStatus::Success);
    assert_eq!(finished.id, run.id);
    assert_eq!(finished.retry_count, 2);
    assert_eq!(harness.strategy.observed_retry_counts(), vec![0, 1, 2]);
    assert_eq!(harness.runs.count(), 1);

    // 第一次重试前等待 60 秒，第二次前等待 120 秒
    assert!(elapsed >= Duration::from_secs(180));
    assert!(elapsed < Duration::from_secs(181));

    assert_eq!(harness.notifier.total(), 1);
    assert_eq!(harness.notifier.count(LifecycleEvent::RunSuccess), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retry_budget_fails_once() {
    let job = JobBuilder::new().with_max_retries(2).build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![failure("a"), failure("b"), failure("c"), failure("d")])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.retry_count, 2);
    assert_eq!(finished.error_message.as_deref(), Some("c"));
    assert_eq!(harness.strategy.call_count(), 3);
    assert_eq!(harness.notifier.total(), 1);
    assert_eq!(harness.notifier.count(LifecycleEvent::RunFailed), 1);
    assert!(harness.artifacts.get_all_artifacts().is_empty());
}

#[tokio::test]
async fn test_zero_retries_fails_after_single_attempt() {
    let job = JobBuilder::new().with_max_retries(0).build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![failure("permission denied")])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.retry_count, 0);
    assert_eq!(harness.strategy.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_a_failure() {
    let job = JobBuilder::new().with_timeout(5).with_max_retries(0).build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![ScriptedAttempt::Delayed(
            Duration::from_secs(30),
            ScriptedStrategy::default_outcome(1),
        )])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished.error_message.unwrap().contains("超时"));
    assert!(harness.artifacts.get_all_artifacts().is_empty());
}

#[tokio::test]
async fn test_partial_upload_records_only_succeeded_destinations() {
    let job = JobBuilder::new().with_destinations(vec![1, 2, 3]).build();
    let outcome = ScriptedStrategy::default_outcome(1).with_failed_destinations(vec![2]);
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![ScriptedAttempt::Outcome(outcome)])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run.clone()).await.unwrap();

    assert_eq!(finished.status, RunStatus::Partial);
    assert!(finished.error_message.is_some());
    let destinations: Vec<i64> = harness
        .artifacts
        .list_by_run(run.id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.destination_id)
        .collect();
    assert_eq!(destinations, vec![1, 3]);
    assert_eq!(harness.notifier.count(LifecycleEvent::RunPartial), 1);
    assert_eq!(harness.notifier.total(), 1);
}

#[tokio::test]
async fn test_every_destination_failing_takes_failure_branch() {
    let job = JobBuilder::new()
        .with_destinations(vec![1, 2])
        .with_max_retries(0)
        .build();
    let outcome = ScriptedStrategy::default_outcome(1).with_failed_destinations(vec![1, 2]);
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![ScriptedAttempt::Outcome(outcome)])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert!(harness.artifacts.get_all_artifacts().is_empty());
    assert_eq!(harness.notifier.count(LifecycleEvent::RunFailed), 1);
}

#[tokio::test]
async fn test_unknown_backup_type_fails_without_retry() {
    let job = JobBuilder::new()
        .with_backup_type("mysql")
        .with_max_retries(3)
        .build();
    let harness = HarnessBuilder::new().jobs(vec![job.clone()]).build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.retry_count, 0);
    assert!(finished.error_message.unwrap().contains("mysql"));
    assert_eq!(harness.strategy.call_count(), 0);
    assert_eq!(harness.notifier.count(LifecycleEvent::RunFailed), 1);
}

#[tokio::test]
async fn test_strategy_configuration_error_is_not_retried() {
    let job = JobBuilder::new().with_max_retries(3).build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![ScriptedAttempt::Misconfigured(
            "missing output_path".to_string(),
        )])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.retry_count, 0);
    assert!(finished.error_message.unwrap().contains("missing output_path"));
    assert_eq!(harness.strategy.call_count(), 1);
    assert_eq!(harness.notifier.count(LifecycleEvent::RunFailed), 1);
}

#[tokio::test]
async fn test_missing_checksum_skips_artifacts() {
    let job = JobBuilder::new().build();
    let outcome = BackupOutcome::success("backup.tar.gz", "/backups/backup.tar.gz", 10, "");
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![ScriptedAttempt::Outcome(outcome)])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Success);
    assert!(harness.artifacts.get_all_artifacts().is_empty());
}

#[tokio::test]
async fn test_notifier_failure_does_not_change_outcome() {
    let job = JobBuilder::new().build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .failing_notifier()
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run.clone()).await.unwrap();

    assert_eq!(finished.status, RunStatus::Success);
    assert_eq!(harness.notifier.total(), 1);
    let stored = harness.runs.get_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Success);
}

#[tokio::test]
async fn test_successful_run_rotates_each_destination() {
    let now = Utc::now();
    let job = JobBuilder::new()
        .with_destinations(vec![1, 2])
        .with_retention_policy(1)
        .with_retention_override(2, 99)
        .build();
    let policy = PolicyBuilder::new().with_id(1).hourly(1).build();
    let old_dest1 = ArtifactBuilder::new()
        .with_id(100)
        .with_destination(1)
        .aged(now, chrono::Duration::hours(3))
        .build();
    let old_dest2 = ArtifactBuilder::new()
        .with_id(101)
        .with_destination(2)
        .aged(now, chrono::Duration::hours(3))
        .build();

    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .policies(vec![policy])
        .artifacts(vec![old_dest1, old_dest2])
        .build();
    let run = harness.create_run(&job).await;

    let finished = harness.executor.execute(run).await.unwrap();
    assert_eq!(finished.status, RunStatus::Success);

    // 目标存储 1 只保留最新的小时桶
    let dest1 = harness
        .artifacts
        .list_non_deleted(&ArtifactScope::destination(job.id, 1))
        .await
        .unwrap();
    assert_eq!(dest1.len(), 1);
    assert_ne!(dest1[0].id, 100);

    // 目标存储 2 指向不存在的策略，跳过轮换
    let dest2 = harness
        .artifacts
        .list_non_deleted(&ArtifactScope::destination(job.id, 2))
        .await
        .unwrap();
    assert_eq!(dest2.len(), 2);

    // 运行后的轮换不单独发出事件
    assert_eq!(harness.notifier.total(), 1);
}

#[tokio::test]
async fn test_run_cancelled_while_queued_is_not_executed() {
    let job = JobBuilder::new().build();
    let harness = HarnessBuilder::new().jobs(vec![job.clone()]).build();
    let run = harness.create_run(&job).await;

    harness.controller().cancel_run(run.id).await.unwrap();
    let finished = harness.executor.execute(run).await.unwrap();

    assert_eq!(finished.status, RunStatus::Cancelled);
    assert_eq!(harness.strategy.call_count(), 0);
    assert_eq!(harness.notifier.total(), 1);
    assert_eq!(harness.notifier.count(LifecycleEvent::RunCancelled), 1);
}
