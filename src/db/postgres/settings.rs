use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::db::{error::DbResult, repos::SettingRepo};

/// Settings always go through the primary pool; a threshold written by an
/// operator must be visible to the very next run.
pub struct PostgresSettingRepo {
    pool: PgPool,
}

impl PostgresSettingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingRepo for PostgresSettingRepo {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
