use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_core::{
    models::{ArtifactScope, BackupArtifact, RotationPlan},
    traits::{ArtifactRepository, RotationPlanner},
    OrchestratorResult,
};
use sqlx::{
    types::Json, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool,
};
use tracing::{debug, instrument};

const ARTIFACT_COLUMNS: &str = "id, run_id, job_id, destination_id, filename, remote_path, \
     size_bytes, checksum_sha256, is_encrypted, backup_type, tags, domain, db_name, server_name, \
     expires_at, is_deleted, deleted_at, created_at";

pub struct SqliteArtifactRepository {
    pool: SqlitePool,
}

impl SqliteArtifactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<BackupArtifact> {
        let tags: Json<Vec<String>> = row.try_get("tags")?;

        Ok(BackupArtifact {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            job_id: row.try_get("job_id")?,
            destination_id: row.try_get("destination_id")?,
            filename: row.try_get("filename")?,
            remote_path: row.try_get("remote_path")?,
            size_bytes: row.try_get("size_bytes")?,
            checksum_sha256: row.try_get("checksum_sha256")?,
            is_encrypted: row.try_get("is_encrypted")?,
            backup_type: row.try_get("backup_type")?,
            tags: tags.0,
            domain: row.try_get("domain")?,
            db_name: row.try_get("db_name")?,
            server_name: row.try_get("server_name")?,
            expires_at: row.try_get("expires_at")?,
            is_deleted: row.try_get("is_deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn scope_query(scope: &ArtifactScope) -> QueryBuilder<'static, Sqlite> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {ARTIFACT_COLUMNS} FROM backup_artifacts WHERE is_deleted = 0 AND job_id = "
        ));
        builder.push_bind(scope.job_id);
        if let Some(destination_id) = scope.destination_id {
            builder.push(" AND destination_id = ").push_bind(destination_id);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        builder
    }

    async fn mark_deleted_on(
        conn: &mut SqliteConnection,
        ids: &[i64],
        at: DateTime<Utc>,
    ) -> OrchestratorResult<u64> {
        let mut marked = 0;
        for id in ids {
            let result = sqlx::query(
                "UPDATE backup_artifacts SET is_deleted = 1, deleted_at = ? WHERE id = ? AND is_deleted = 0",
            )
            .bind(at)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            marked += result.rows_affected();
        }
        Ok(marked)
    }

    async fn plan_and_mark(
        conn: &mut SqliteConnection,
        scope: &ArtifactScope,
        planner: &RotationPlanner<'_>,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<RotationPlan> {
        let rows = Self::scope_query(scope)
            .build()
            .fetch_all(&mut *conn)
            .await?;
        let snapshot = rows
            .iter()
            .map(Self::row_to_artifact)
            .collect::<OrchestratorResult<Vec<_>>>()?;

        let plan = planner(&snapshot);
        Self::mark_deleted_on(conn, &plan.delete_ids(), at).await?;
        Ok(plan)
    }
}

#[async_trait]
impl ArtifactRepository for SqliteArtifactRepository {
    #[instrument(skip(self, artifacts), fields(count = artifacts.len()))]
    async fn create_batch(
        &self,
        artifacts: &[BackupArtifact],
    ) -> OrchestratorResult<Vec<BackupArtifact>> {
        let sql = format!(
            r#"
            INSERT INTO backup_artifacts (run_id, job_id, destination_id, filename, remote_path,
                                          size_bytes, checksum_sha256, is_encrypted, backup_type,
                                          tags, domain, db_name, server_name, expires_at,
                                          is_deleted, deleted_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {ARTIFACT_COLUMNS}
            "#
        );

        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let row = sqlx::query(&sql)
                .bind(artifact.run_id)
                .bind(artifact.job_id)
                .bind(artifact.destination_id)
                .bind(&artifact.filename)
                .bind(&artifact.remote_path)
                .bind(artifact.size_bytes)
                .bind(&artifact.checksum_sha256)
                .bind(artifact.is_encrypted)
                .bind(&artifact.backup_type)
                .bind(Json(&artifact.tags))
                .bind(&artifact.domain)
                .bind(&artifact.db_name)
                .bind(&artifact.server_name)
                .bind(artifact.expires_at)
                .bind(artifact.is_deleted)
                .bind(artifact.deleted_at)
                .bind(artifact.created_at)
                .fetch_one(&mut *tx)
                .await?;
            created.push(Self::row_to_artifact(&row)?);
        }
        tx.commit().await?;

        debug!("写入 {} 条备份产物记录", created.len());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupArtifact>> {
        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM backup_artifacts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_artifact(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_run(&self, run_id: i64) -> OrchestratorResult<Vec<BackupArtifact>> {
        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM backup_artifacts WHERE run_id = ? ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_artifact).collect()
    }

    async fn list_non_deleted(
        &self,
        scope: &ArtifactScope,
    ) -> OrchestratorResult<Vec<BackupArtifact>> {
        let rows = Self::scope_query(scope)
            .build()
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_artifact).collect()
    }

    async fn mark_deleted(&self, ids: &[i64], at: DateTime<Utc>) -> OrchestratorResult<u64> {
        let mut tx = self.pool.begin().await?;
        let marked = Self::mark_deleted_on(&mut tx, ids, at).await?;
        tx.commit().await?;
        Ok(marked)
    }

    #[instrument(skip(self, planner), fields(job_id = scope.job_id, destination_id = ?scope.destination_id))]
    async fn rotate_scope(
        &self,
        scope: &ArtifactScope,
        planner: &RotationPlanner<'_>,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<RotationPlan> {
        // BEGIN IMMEDIATE 在读取快照之前就拿到写锁，并发轮换会在此排队；
        // 事务守卫在出错、提交失败或被取消时回滚
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let plan = Self::plan_and_mark(&mut tx, scope, planner, at).await?;
        tx.commit().await?;

        debug!(
            "轮换作用域 job={} dest={:?}: 共 {} 条，删除 {} 条",
            scope.job_id,
            scope.destination_id,
            plan.total,
            plan.to_delete.len()
        );
        Ok(plan)
    }
}
