use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{error::DbResult, repos::JobLeaseRepo};

pub struct SqliteJobLeaseRepo {
    pool: SqlitePool,
}

impl SqliteJobLeaseRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLeaseRepo for SqliteJobLeaseRepo {
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        now_ms: i64,
        expires_at_ms: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_leases (name, holder, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT (name) DO UPDATE
                SET holder = excluded.holder, expires_at = excluded.expires_at
                WHERE job_leases.expires_at <= ? OR job_leases.holder = excluded.holder
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(expires_at_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, name: &str, holder: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM job_leases WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
