use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::InboundRepo,
    },
    models::{CreateInbound, Inbound},
};

pub struct PostgresInboundRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresInboundRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_inbound(row: &sqlx::postgres::PgRow) -> Inbound {
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
impl InboundRepo for PostgresInboundRepo {
    async fn create(&self, input: CreateInbound) -> DbResult<Inbound> {
        let row = sqlx::query(
            r#"
            INSERT INTO inbounds (tag, protocol, port, enable)
            VALUES ($1, $2, $3, TRUE)
            RETURNING id
            "#,
        )
        .bind(&input.tag)
        .bind(&input.protocol)
        .bind(input.port)
        .fetch_one(&self.write_pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Inbound with tag '{}' already exists", input.tag))
            }
            _ => DbError::from(e),
        })?;

        Ok(Inbound {
            id: row.get("id"),
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
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
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
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_inbound).collect())
    }
}
