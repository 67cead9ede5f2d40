use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orchestrator_core::{
    models::{BackupRun, RunFilter, RunLogEntry, RunStatus},
    traits::RunRepository,
    OrchestratorError, OrchestratorResult,
};
use sqlx::{types::Json, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

const RUN_COLUMNS: &str = "id, job_id, target_id, status, started_at, finished_at, size_bytes, \
     log_lines, error_message, triggered_by, retry_count, created_at";

pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<BackupRun> {
        let log_lines: Json<Vec<RunLogEntry>> = row.try_get("log_lines")?;

        Ok(BackupRun {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            target_id: row.try_get("target_id")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            size_bytes: row.try_get("size_bytes")?,
            log_lines: log_lines.0,
            error_message: row.try_get("error_message")?,
            triggered_by: row.try_get("triggered_by")?,
            retry_count: row.try_get("retry_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    #[instrument(skip(self, run), fields(job_id = %run.job_id, triggered_by = %run.triggered_by))]
    async fn create(&self, run: &BackupRun) -> OrchestratorResult<BackupRun> {
        let sql = format!(
            r#"
            INSERT INTO backup_runs (job_id, target_id, status, started_at, finished_at, size_bytes,
                                     log_lines, error_message, triggered_by, retry_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {RUN_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(run.job_id)
            .bind(run.target_id)
            .bind(run.status)
            .bind(run.started_at)
            .bind(run.finished_at)
            .bind(run.size_bytes)
            .bind(Json(&run.log_lines))
            .bind(&run.error_message)
            .bind(run.triggered_by)
            .bind(run.retry_count)
            .bind(run.created_at)
            .fetch_one(&self.pool)
            .await?;

        let created = Self::row_to_run(&row)?;
        debug!("创建运行实例成功: ID {} (任务 {})", created.id, created.job_id);
        Ok(created)
    }

    #[instrument(skip(self, run), fields(job_id = %run.job_id, window_start = %window_start))]
    async fn create_if_absent_since(
        &self,
        run: &BackupRun,
        window_start: DateTime<Utc>,
    ) -> OrchestratorResult<Option<BackupRun>> {
        // 单条语句完成检查与插入，SQLite 的写锁保证并发调度实例之间互斥
        let sql = format!(
            r#"
            INSERT INTO backup_runs (job_id, target_id, status, started_at, finished_at, size_bytes,
                                     log_lines, error_message, triggered_by, retry_count, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM backup_runs WHERE job_id = ? AND created_at >= ?
            )
            RETURNING {RUN_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(run.job_id)
            .bind(run.target_id)
            .bind(run.status)
            .bind(run.started_at)
            .bind(run.finished_at)
            .bind(run.size_bytes)
            .bind(Json(&run.log_lines))
            .bind(&run.error_message)
            .bind(run.triggered_by)
            .bind(run.retry_count)
            .bind(run.created_at)
            .bind(run.job_id)
            .bind(window_start)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_run(&row)?)),
            None => {
                debug!("任务 {} 在窗口内已有运行实例，跳过", run.job_id);
                Ok(None)
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<BackupRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM backup_runs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_run(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &RunFilter) -> OrchestratorResult<Vec<BackupRun>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {RUN_COLUMNS} FROM backup_runs WHERE 1 = 1"));

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(job_id) = filter.job_id {
            builder.push(" AND job_id = ").push_bind(job_id);
        }
        if let Some(target_id) = filter.target_id {
            builder.push(" AND target_id = ").push_bind(target_id);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        builder
            .push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_run).collect()
    }

    async fn exists_since(&self, job_id: i64, since: DateTime<Utc>) -> OrchestratorResult<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM backup_runs WHERE job_id = ? AND created_at >= ?)",
        )
        .bind(job_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    #[instrument(skip(self, run), fields(run_id = %run.id, status = %run.status))]
    async fn update_if_running(&self, run: &BackupRun) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE backup_runs
            SET status = ?, started_at = ?, finished_at = ?, size_bytes = ?, log_lines = ?,
                error_message = ?, retry_count = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(run.status)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.size_bytes)
        .bind(Json(&run.log_lines))
        .bind(&run.error_message)
        .bind(run.retry_count)
        .bind(run.id)
        .bind(RunStatus::Running)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // 区分"已被迁移到终态"与"记录不存在"
        match self.get_by_id(run.id).await? {
            Some(current) => {
                debug!(
                    "运行实例 {} 当前状态为 {}，拒绝写入 {}",
                    run.id, current.status, run.status
                );
                Ok(false)
            }
            None => Err(OrchestratorError::RunNotFound { id: run.id }),
        }
    }

    async fn cancel_if_running(
        &self,
        id: i64,
        at: DateTime<Utc>,
        entry: &RunLogEntry,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE backup_runs
            SET status = ?, finished_at = ?, log_lines = json_insert(log_lines, '$[#]', json(?))
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(RunStatus::Cancelled)
        .bind(at)
        .bind(Json(entry))
        .bind(id)
        .bind(RunStatus::Running)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!("运行实例 {} 已取消", id);
            return Ok(true);
        }

        match self.get_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(OrchestratorError::RunNotFound { id }),
        }
    }

    async fn append_log(&self, id: i64, entry: &RunLogEntry) -> OrchestratorResult<()> {
        let result = sqlx::query(
            "UPDATE backup_runs SET log_lines = json_insert(log_lines, '$[#]', json(?)) WHERE id = ?",
        )
        .bind(Json(entry))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::RunNotFound { id });
        }
        Ok(())
    }
}
