//! 调度器集成测试共用的组件装配

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::{
    config::{ExecutorConfig, SchedulerConfig},
    models::{BackupArtifact, BackupJob, BackupRun, MaxAgeMode, RetentionPolicy, TriggerSource},
    traits::RunRepository,
    StrategyRegistry,
};
use orchestrator_dispatcher::{
    BackupScheduler, CancellationRegistry, RotationService, RunController, RunExecutor,
    WorkerPool,
};
use orchestrator_testing_utils::{
    MockArtifactRepository, MockJobRepository, MockRetentionPolicyRepository, MockRunRepository,
    MockTargetRepository, RecordingNotifier, ScriptedAttempt, ScriptedStrategy, TargetBuilder,
};

pub struct Harness {
    pub jobs: MockJobRepository,
    pub runs: MockRunRepository,
    pub artifacts: MockArtifactRepository,
    pub policies: MockRetentionPolicyRepository,
    pub targets: MockTargetRepository,
    pub notifier: RecordingNotifier,
    pub strategy: ScriptedStrategy,
    pub strategies: Arc<StrategyRegistry>,
    pub rotation: Arc<RotationService>,
    pub executor: Arc<RunExecutor>,
    pub pool: Arc<WorkerPool>,
}

pub struct HarnessBuilder {
    jobs: Vec<BackupJob>,
    policies: Vec<RetentionPolicy>,
    artifacts: Vec<BackupArtifact>,
    script: Vec<ScriptedAttempt>,
    notifier: RecordingNotifier,
    mode: MaxAgeMode,
    executor_config: ExecutorConfig,
    max_concurrent_runs: usize,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            policies: Vec::new(),
            artifacts: Vec::new(),
            script: Vec::new(),
            notifier: RecordingNotifier::new(),
            mode: MaxAgeMode::KeepSetWins,
            executor_config: ExecutorConfig::default(),
            max_concurrent_runs: 4,
        }
    }

    pub fn jobs(mut self, jobs: Vec<BackupJob>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn policies(mut self, policies: Vec<RetentionPolicy>) -> Self {
        self.policies = policies;
        self
    }

    pub fn artifacts(mut self, artifacts: Vec<BackupArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn script(mut self, script: Vec<ScriptedAttempt>) -> Self {
        self.script = script;
        self
    }

    pub fn failing_notifier(mut self) -> Self {
        self.notifier = RecordingNotifier::failing();
        self
    }

    pub fn mode(mut self, mode: MaxAgeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    pub fn build(self) -> Harness {
        let jobs = MockJobRepository::with_jobs(self.jobs);
        let runs = MockRunRepository::new();
        let artifacts = MockArtifactRepository::with_artifacts(self.artifacts);
        let policies = MockRetentionPolicyRepository::with_policies(self.policies);
        let targets = MockTargetRepository::with_targets(vec![TargetBuilder::new()
            .with_id(1)
            .with_name("db-01")
            .build()]);
        let notifier = self.notifier;
        let strategy = ScriptedStrategy::new(self.script);

        let strategies = Arc::new(
            StrategyRegistry::new()
                .with_strategy("files", Arc::new(strategy.clone()))
                .with_strategy("custom", Arc::new(strategy.clone())),
        );

        let rotation = Arc::new(RotationService::new(
            Arc::new(jobs.clone()),
            Arc::new(artifacts.clone()),
            Arc::new(policies.clone()),
            Arc::new(notifier.clone()),
            self.mode,
        ));

        let executor = Arc::new(RunExecutor::new(
            Arc::new(jobs.clone()),
            Arc::new(runs.clone()),
            Arc::new(artifacts.clone()),
            Arc::new(targets.clone()),
            Arc::clone(&strategies),
            Arc::clone(&rotation),
            Arc::new(notifier.clone()),
            CancellationRegistry::new(),
            &self.executor_config,
        ));

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&executor),
            self.max_concurrent_runs,
            false,
        ));

        Harness {
            jobs,
            runs,
            artifacts,
            policies,
            targets,
            notifier,
            strategy,
            strategies,
            rotation,
            executor,
            pool,
        }
    }
}

impl Harness {
    /// 向台账写入一个 running 状态的运行实例，但不执行
    pub async fn create_run(&self, job: &BackupJob) -> BackupRun {
        let run = BackupRun::new(job.id, job.target_id, TriggerSource::Manual);
        self.runs.create(&run).await.unwrap()
    }

    pub fn controller(&self) -> RunController {
        RunController::new(
            Arc::new(self.jobs.clone()),
            Arc::new(self.runs.clone()),
            Arc::new(self.targets.clone()),
            Arc::new(self.policies.clone()),
            Arc::clone(&self.strategies),
            Arc::new(self.notifier.clone()),
            Arc::clone(&self.pool),
        )
    }

    pub fn scheduler(&self) -> BackupScheduler {
        BackupScheduler::new(
            Arc::new(self.jobs.clone()),
            Arc::new(self.runs.clone()),
            Arc::clone(&self.pool),
            SchedulerConfig::default(),
        )
    }

    /// 等待脚本策略被调用 `calls` 次
    pub async fn wait_for_calls(&self, calls: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.strategy.call_count() < calls {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("strategy was not called in time");
    }
}
