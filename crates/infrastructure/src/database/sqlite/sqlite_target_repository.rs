use async_trait::async_trait;
use orchestrator_core::{models::Target, traits::TargetRepository, OrchestratorResult};
use sqlx::{Row, SqlitePool};

pub struct SqliteTargetRepository {
    pool: SqlitePool,
}

impl SqliteTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_target(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Target> {
        Ok(Target {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            port: row.try_get("port")?,
            username: row.try_get("username")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl TargetRepository for SqliteTargetRepository {
    async fn create(&self, target: &Target) -> OrchestratorResult<Target> {
        let row = sqlx::query(
            r#"
            INSERT INTO targets (name, host, port, username, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, name, host, port, username, is_active, created_at
            "#,
        )
        .bind(&target.name)
        .bind(&target.host)
        .bind(target.port)
        .bind(&target.username)
        .bind(target.is_active)
        .bind(target.created_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_target(&row)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Target>> {
        let row = sqlx::query(
            "SELECT id, name, host, port, username, is_active, created_at FROM targets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_target(&row)?)),
            None => Ok(None),
        }
    }
}
