pub mod sqlite_artifact_repository;
pub mod sqlite_job_repository;
pub mod sqlite_retention_policy_repository;
pub mod sqlite_run_repository;
pub mod sqlite_target_repository;

pub use sqlite_artifact_repository::SqliteArtifactRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_retention_policy_repository::SqliteRetentionPolicyRepository;
pub use sqlite_run_repository::SqliteRunRepository;
pub use sqlite_target_repository::SqliteTargetRepository;
