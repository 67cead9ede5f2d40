use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 备份产物记录
///
/// 创建时间一经写入不再改变，轮换决策以它为依据。轮换只会设置
/// `is_deleted` / `deleted_at`，不会物理删除或修改其他字段。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupArtifact {
    pub id: i64,
    pub run_id: i64,
    pub job_id: i64,
    pub destination_id: i64,
    pub filename: String,
    pub remote_path: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub is_encrypted: bool,
    pub backup_type: String,
    pub tags: Vec<String>,
    pub domain: Option<String>,
    pub db_name: Option<String>,
    pub server_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 轮换作用域：一个任务，可选地收窄到单个目标存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactScope {
    pub job_id: i64,
    pub destination_id: Option<i64>,
}

impl ArtifactScope {
    pub fn job(job_id: i64) -> Self {
        Self {
            job_id,
            destination_id: None,
        }
    }

    pub fn destination(job_id: i64, destination_id: i64) -> Self {
        Self {
            job_id,
            destination_id: Some(destination_id),
        }
    }

    pub fn contains(&self, artifact: &BackupArtifact) -> bool {
        artifact.job_id == self.job_id
            && self
                .destination_id
                .map_or(true, |dest| dest == artifact.destination_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(job_id: i64, destination_id: i64) -> BackupArtifact {
        BackupArtifact {
            id: 1,
            run_id: 1,
            job_id,
            destination_id,
            filename: "db.dump.gz".to_string(),
            remote_path: "/tmp/db.dump.gz".to_string(),
            size_bytes: 1024,
            checksum_sha256: "abc".to_string(),
            is_encrypted: false,
            backup_type: "postgresql".to_string(),
            tags: vec![],
            domain: None,
            db_name: None,
            server_name: None,
            expires_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_scope_contains() {
        let a = artifact(1, 10);
        assert!(ArtifactScope::job(1).contains(&a));
        assert!(ArtifactScope::destination(1, 10).contains(&a));
        assert!(!ArtifactScope::destination(1, 11).contains(&a));
        assert!(!ArtifactScope::job(2).contains(&a));
    }
}
