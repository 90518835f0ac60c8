use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::{error::DbResult, repos::JobLeaseRepo};

/// Leases only make sense against the primary.
pub struct PostgresJobLeaseRepo {
    pool: PgPool,
}

impl PostgresJobLeaseRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLeaseRepo for PostgresJobLeaseRepo {
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
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
                SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
                WHERE job_leases.expires_at <= $4 OR job_leases.holder = EXCLUDED.holder
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
        sqlx::query("DELETE FROM job_leases WHERE name = $1 AND holder = $2")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
