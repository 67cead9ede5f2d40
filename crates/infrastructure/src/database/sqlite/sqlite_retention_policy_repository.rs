use async_trait::async_trait;
use orchestrator_core::{models::RetentionPolicy, traits::RetentionPolicyRepository, OrchestratorResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteRetentionPolicyRepository {
    pool: SqlitePool,
}

impl SqliteRetentionPolicyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_policy(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<RetentionPolicy> {
        Ok(RetentionPolicy {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            keep_hourly: row.try_get("keep_hourly")?,
            keep_daily: row.try_get("keep_daily")?,
            keep_weekly: row.try_get("keep_weekly")?,
            keep_monthly: row.try_get("keep_monthly")?,
            keep_yearly: row.try_get("keep_yearly")?,
            max_age_days: row.try_get("max_age_days")?,
        })
    }
}

#[async_trait]
impl RetentionPolicyRepository for SqliteRetentionPolicyRepository {
    async fn create(&self, policy: &RetentionPolicy) -> OrchestratorResult<RetentionPolicy> {
        let row = sqlx::query(
            r#"
            INSERT INTO retention_policies (name, keep_hourly, keep_daily, keep_weekly,
                                            keep_monthly, keep_yearly, max_age_days)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, name, keep_hourly, keep_daily, keep_weekly, keep_monthly, keep_yearly, max_age_days
            "#,
        )
        .bind(&policy.name)
        .bind(policy.keep_hourly)
        .bind(policy.keep_daily)
        .bind(policy.keep_weekly)
        .bind(policy.keep_monthly)
        .bind(policy.keep_yearly)
        .bind(policy.max_age_days)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_policy(&row)?;
        debug!("创建保留策略成功: {} (ID: {})", created.name, created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<RetentionPolicy>> {
        let row = sqlx::query(
            "SELECT id, name, keep_hourly, keep_daily, keep_weekly, keep_monthly, keep_yearly, max_age_days
             FROM retention_policies WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_policy(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> OrchestratorResult<Vec<RetentionPolicy>> {
        let rows = sqlx::query(
            "SELECT id, name, keep_hourly, keep_daily, keep_weekly, keep_monthly, keep_yearly, max_age_days
             FROM retention_policies ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_policy).collect()
    }
}
