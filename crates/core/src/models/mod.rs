pub mod artifact;
pub mod backup_run;
pub mod job;
pub mod retention;
pub mod target;

pub use artifact::{ArtifactScope, BackupArtifact};
pub use backup_run::{BackupRun, LogLevel, RunFilter, RunLogEntry, RunStatus, TriggerSource};
pub use job::{BackupJob, JobFilter};
pub use retention::{
    MaxAgeMode, RetentionPolicy, RotationCandidate, RotationOutcome, RotationPlan,
    RotationPreview, RotationReason,
};
pub use target::Target;
