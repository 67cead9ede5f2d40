use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use orchestrator_core::{
    models::{BackupJob, JobFilter},
    traits::JobRepository,
    OrchestratorError, OrchestratorResult,
};
use sqlx::{types::Json, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

const JOB_COLUMNS: &str = "id, name, target_id, backup_type, schedule_cron, source_config, \
     destination_ids, retention_policy_id, retention_overrides, max_retries, timeout_seconds, \
     encrypt, tags, domain, is_active, created_at, updated_at";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<BackupJob> {
        let source_config: Json<serde_json::Value> = row.try_get("source_config")?;
        let destination_ids: Json<Vec<i64>> = row.try_get("destination_ids")?;
        let retention_overrides: Json<HashMap<i64, i64>> = row.try_get("retention_overrides")?;
        let tags: Json<Vec<String>> = row.try_get("tags")?;

        Ok(BackupJob {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            target_id: row.try_get("target_id")?,
            backup_type: row.try_get("backup_type")?,
            schedule_cron: row.try_get("schedule_cron")?,
            source_config: source_config.0,
            destination_ids: destination_ids.0,
            retention_policy_id: row.try_get("retention_policy_id")?,
            retention_overrides: retention_overrides.0,
            max_retries: row.try_get("max_retries")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            encrypt: row.try_get("encrypt")?,
            tags: tags.0,
            domain: row.try_get("domain")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_name = %job.name, backup_type = %job.backup_type))]
    async fn create(&self, job: &BackupJob) -> OrchestratorResult<BackupJob> {
        let sql = format!(
            r#"
            INSERT INTO backup_jobs (name, target_id, backup_type, schedule_cron, source_config,
                                     destination_ids, retention_policy_id, retention_overrides,
                                     max_retries, timeout_seconds, encrypt, tags, domain,
                                     is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(&job.name)
            .bind(job.target_id)
            .bind(&job.backup_type)
            .bind(&job.schedule_cron)
            .bind(Json(&job.source_config))
            .bind(Json(&job.destination_ids))
            .bind(job.retention_policy_id)
            .bind(Json(&job.retention_overrides))
            .bind(job.max_retries)
            .bind(job.timeout_seconds)
            .bind(job.encrypt)
            .bind(Json(&job.tags))
            .bind(&job.domain)
            .bind(job.is_active)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&self.pool)
            .await?;

        let created = Self::row_to_job(&row)?;
        debug!("创建备份任务成功: {} (ID: {})", created.name, created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM backup_jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, job: &BackupJob) -> OrchestratorResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE backup_jobs
            SET name = ?, target_id = ?, backup_type = ?, schedule_cron = ?, source_config = ?,
                destination_ids = ?, retention_policy_id = ?, retention_overrides = ?,
                max_retries = ?, timeout_seconds = ?, encrypt = ?, tags = ?, domain = ?,
                is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.name)
        .bind(job.target_id)
        .bind(&job.backup_type)
        .bind(&job.schedule_cron)
        .bind(Json(&job.source_config))
        .bind(Json(&job.destination_ids))
        .bind(job.retention_policy_id)
        .bind(Json(&job.retention_overrides))
        .bind(job.max_retries)
        .bind(job.timeout_seconds)
        .bind(job.encrypt)
        .bind(Json(&job.tags))
        .bind(&job.domain)
        .bind(job.is_active)
        .bind(Utc::now())
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::JobNotFound { id: job.id });
        }

        debug!("更新备份任务成功: ID {}", job.id);
        Ok(())
    }

    async fn list(&self, filter: &JobFilter) -> OrchestratorResult<Vec<BackupJob>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM backup_jobs WHERE 1 = 1"));

        if let Some(is_active) = filter.is_active {
            builder.push(" AND is_active = ").push_bind(is_active);
        }
        if let Some(backup_type) = &filter.backup_type {
            builder.push(" AND backup_type = ").push_bind(backup_type.clone());
        }
        if let Some(domain) = &filter.domain {
            builder.push(" AND domain = ").push_bind(domain.clone());
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    async fn get_active_jobs(&self) -> OrchestratorResult<Vec<BackupJob>> {
        self.list(&JobFilter {
            is_active: Some(true),
            ..Default::default()
        })
        .await
    }

    async fn set_active(&self, id: i64, is_active: bool) -> OrchestratorResult<()> {
        let result = sqlx::query("UPDATE backup_jobs SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::JobNotFound { id });
        }

        debug!("备份任务 {} 启用状态更新为 {}", id, is_active);
        Ok(())
    }
}
