use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::InboundRepo,
    },
    models::{CreateInbound, Inbound},
};

pub struct SqliteInboundRepo {
    pool: SqlitePool,
}

impl SqliteInboundRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_inbound(row: &sqlx::sqlite::SqliteRow) -> Inbound {
        Inbound {
            id: row.get("id"),
            tag: row.get("tag"),
            protocol: row.get("protocol"),
            port: row.get("port"),
            enabled: row.get("enable"),
        }
    }
}

#[async_trait]
impl InboundRepo for SqliteInboundRepo {
    async fn create(&self, input: CreateInbound) -> DbResult<Inbound> {
        let result = sqlx::query(
            r#"
            INSERT INTO inbounds (tag, protocol, port, enable)
            VALUES (?, ?, ?, TRUE)
            "#,
        )
        .bind(&input.tag)
        .bind(&input.protocol)
        .bind(input.port)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Inbound with tag '{}' already exists", input.tag))
            }
            _ => DbError::from(e),
        })?;

        Ok(Inbound {
            id: result.last_insert_rowid(),
            tag: input.tag,
            protocol: input.protocol,
            port: input.port,
            enabled: true,
        })
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<Inbound>> {
        let row = sqlx::query(
            r#"
            SELECT id, tag, protocol, port, enable
            FROM inbounds
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_inbound))
    }

    async fn list(&self) -> DbResult<Vec<Inbound>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tag, protocol, port, enable
            FROM inbounds
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_inbound).collect())
    }
}
