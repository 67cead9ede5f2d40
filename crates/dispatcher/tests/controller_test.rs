mod common;

use orchestrator_core::{
    models::{RunStatus, TriggerSource},
    traits::{LifecycleEvent, RunRepository},
    OrchestratorError,
};
use orchestrator_testing_utils::{JobBuilder, PolicyBuilder, RunBuilder, ScriptedAttempt};

use common::HarnessBuilder;

#[tokio::test]
async fn test_manual_trigger_bypasses_schedule() {
    // 每年一次，测试期间不会到期
    let job = JobBuilder::new().with_schedule("0 0 0 1 1 *").build();
    let harness = HarnessBuilder::new().jobs(vec![job.clone()]).build();
    let controller = harness.controller();

    let first = controller.trigger_manual(job.id).await.unwrap();
    let second = controller.trigger_manual(job.id).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(first.triggered_by, TriggerSource::Manual);

    harness.pool.drain().await;
    let runs = harness.runs.runs_for_job(job.id);
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    assert_eq!(harness.notifier.count(LifecycleEvent::RunSuccess), 2);
}

#[tokio::test]
async fn test_manual_trigger_unknown_job() {
    let harness = HarnessBuilder::new().build();

    let result = harness.controller().trigger_manual(42).await;

    assert!(matches!(result, Err(OrchestratorError::JobNotFound { id: 42 })));
    assert_eq!(harness.runs.count(), 0);
}

#[tokio::test]
async fn test_cancel_in_flight_run_emits_single_event() {
    let job = JobBuilder::new().with_max_retries(2).build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![ScriptedAttempt::HangUntilCancelled])
        .build();
    let controller = harness.controller();

    let run = controller.trigger_manual(job.id).await.unwrap();
    harness.wait_for_calls(1).await;

    let cancelled = controller.cancel_run(run.id).await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert!(cancelled.finished_at.is_some());

    harness.pool.drain().await;

    let stored = harness.runs.get_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Cancelled);
    // 被中止的尝试不会重试
    assert_eq!(harness.strategy.call_count(), 1);
    assert_eq!(harness.notifier.total(), 1);
    assert_eq!(harness.notifier.count(LifecycleEvent::RunCancelled), 1);
}

#[tokio::test]
async fn test_late_terminal_write_is_discarded() {
    let job = JobBuilder::new().with_max_retries(0).build();
    let harness = HarnessBuilder::new()
        .jobs(vec![job.clone()])
        .script(vec![ScriptedAttempt::HangUntilCancelled])
        .build();
    let controller = harness.controller();

    let run = controller.trigger_manual(job.id).await.unwrap();
    harness.wait_for_calls(1).await;
    controller.cancel_run(run.id).await.unwrap();
    harness.pool.drain().await;

    let stored = harness.runs.get_by_id(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Cancelled);
    assert!(stored
        .log_lines
        .iter()
        .any(|l| l.message.contains("result discarded")));
    assert_eq!(harness.notifier.count(LifecycleEvent::RunFailed), 0);
    assert_eq!(harness.notifier.total(), 1);
}

#[tokio::test]
async fn test_concurrent_cancels_succeed_once() {
    let job = JobBuilder::new().build();
    let harness = HarnessBuilder::new().jobs(vec![job.clone()]).build();
    let run = harness.create_run(&job).await;
    let controller = harness.controller();

    let (a, b) = tokio::join!(controller.cancel_run(run.id), controller.cancel_run(run.id));

    assert_eq!(a.is_ok() as usize + b.is_ok() as usize, 1);
    let rejected = if a.is_err() { a } else { b };
    assert!(matches!(
        rejected,
        Err(OrchestratorError::CannotCancel {
            status: RunStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(harness.notifier.count(LifecycleEvent::RunCancelled), 1);
}

#[tokio::test]
async fn test_cancel_rejected_for_terminal_run() {
    let harness = HarnessBuilder::new().build();
    let finished = RunBuilder::new().with_status(RunStatus::Success).build();
    let finished = harness.runs.create(&finished).await.unwrap();

    let result = harness.controller().cancel_run(finished.id).await;

    match result {
        Err(OrchestratorError::CannotCancel { id, status }) => {
            assert_eq!(id, finished.id);
            assert_eq!(status, RunStatus::Success);
        }
        other => panic!("意外的结果: {other:?}"),
    }
    assert_eq!(harness.notifier.total(), 0);
}

#[tokio::test]
async fn test_cancel_unknown_run() {
    let harness = HarnessBuilder::new().build();
    let result = harness.controller().cancel_run(7).await;
    assert!(matches!(result, Err(OrchestratorError::RunNotFound { id: 7 })));
}

#[tokio::test]
async fn test_restart_failed_run_carries_retry_count() {
    let job = JobBuilder::new().build();
    let harness = HarnessBuilder::new().jobs(vec![job.clone()]).build();
    let failed = RunBuilder::new()
        .with_job(job.id)
        .with_status(RunStatus::Failed)
        .with_retry_count(2)
        .with_error("disk full")
        .build();
    let failed = harness.runs.create(&failed).await.unwrap();

    let restarted = harness.controller().restart_run(failed.id).await.unwrap();

    assert_ne!(restarted.id, failed.id);
    assert_eq!(restarted.triggered_by, TriggerSource::Retry);
    assert_eq!(restarted.retry_count, 2);

    harness.pool.drain().await;
    let stored = harness.runs.get_by_id(restarted.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Success);
    let original = harness.runs.get_by_id(failed.id).await.unwrap().unwrap();
    assert_eq!(original.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_restart_rejected_for_non_failed_run() {
    let harness = HarnessBuilder::new().jobs(vec![JobBuilder::new().build()]).build();
    let done = RunBuilder::new().with_status(RunStatus::Success).build();
    let done = harness.runs.create(&done).await.unwrap();

    let result = harness.controller().restart_run(done.id).await;

    assert!(matches!(
        result,
        Err(OrchestratorError::InvalidRunState {
            status: RunStatus::Success,
            ..
        })
    ));
}

#[tokio::test]
async fn test_create_job_normalizes_five_field_cron() {
    let harness = HarnessBuilder::new()
        .policies(vec![PolicyBuilder::new().with_id(1).daily(7).build()])
        .build();
    let job = JobBuilder::new()
        .with_schedule("30 1 * * 1-5")
        .with_retention_policy(1)
        .build();

    let created = harness.controller().create_job(job).await.unwrap();

    assert_eq!(created.schedule_cron, "0 30 1 * * 2,3,4,5,6");
    assert_eq!(harness.jobs.count(), 1);
}

#[tokio::test]
async fn test_create_job_rejects_configuration_errors() {
    let harness = HarnessBuilder::new().build();
    let controller = harness.controller();

    let bad_cron = JobBuilder::new().with_schedule("61 * * * *").build();
    assert!(matches!(
        controller.create_job(bad_cron).await,
        Err(OrchestratorError::InvalidCron { .. })
    ));

    let bad_type = JobBuilder::new().with_backup_type("ftp").build();
    assert!(matches!(
        controller.create_job(bad_type).await,
        Err(OrchestratorError::UnknownBackupType(t)) if t == "ftp"
    ));

    let bad_policy = JobBuilder::new().with_retention_override(1, 5).build();
    assert!(matches!(
        controller.create_job(bad_policy).await,
        Err(OrchestratorError::RetentionPolicyNotFound { id: 5 })
    ));

    let bad_target = JobBuilder::new().with_target(9).build();
    assert!(matches!(
        controller.create_job(bad_target).await,
        Err(OrchestratorError::TargetNotFound { id: 9 })
    ));

    assert_eq!(harness.jobs.count(), 0);
}

#[tokio::test]
async fn test_schedule_preview_lists_upcoming_fire_times() {
    use chrono::Timelike;

    let job = JobBuilder::new().with_schedule("0 0 2 * * *").build();
    let harness = HarnessBuilder::new().jobs(vec![job.clone()]).build();

    let times = harness
        .controller()
        .schedule_preview(job.id, 3)
        .await
        .unwrap();

    assert_eq!(times.len(), 3);
    assert!(times.windows(2).all(|w| w[1] - w[0] == chrono::Duration::days(1)));
    assert!(times.iter().all(|t| t.hour() == 2 && t.minute() == 0));
}
