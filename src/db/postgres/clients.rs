use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ClientRepo,
    },
    models::{Client, ClientTraffic, ClientUsage, CreateClient},
};

pub struct PostgresClientRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresClientRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn row_to_client(row: &sqlx::postgres::PgRow) -> Client {
        Client {
            id: row.get("id"),
            inbound_id: row.get("inbound_id"),
            email: row.get("email"),
            enabled: row.get("enable"),
            total_bytes: row.get("total_bytes"),
            expiry_time: row.get("expiry_time"),
        }
    }
}

#[async_trait]
impl ClientRepo for PostgresClientRepo {
    async fn create_client(&self, input: CreateClient) -> DbResult<Client> {
        let row = sqlx::query(
            r#"
            INSERT INTO clients (inbound_id, email, enable, total_bytes, expiry_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(input.inbound_id)
        .bind(&input.email)
        .bind(input.enabled)
        .bind(input.total_bytes)
        .bind(input.expiry_time)
        .fetch_one(&self.write_pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!(
                    "Client '{}' already exists in inbound {}",
                    input.email, input.inbound_id
                ))
            }
            _ => DbError::from(e),
        })?;

        Ok(Client {
            id: row.get("id"),
            inbound_id: input.inbound_id,
            email: input.email,
            enabled: input.enabled,
            total_bytes: input.total_bytes,
            expiry_time: input.expiry_time,
        })
    }

    async fn get_client(&self, inbound_id: i64, email: &str) -> DbResult<Option<Client>> {
        let row = sqlx::query(
            r#"
            SELECT id, inbound_id, email, enable, total_bytes, expiry_time
            FROM clients
            WHERE inbound_id = $1 AND email = $2
            "#,
        )
        .bind(inbound_id)
        .bind(email)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_client))
    }

    async fn list_inbound_clients(&self, inbound_id: i64) -> DbResult<Vec<Client>> {
        let rows = sqlx::query(
            r#"
            SELECT id, inbound_id, email, enable, total_bytes, expiry_time
            FROM clients
            WHERE inbound_id = $1
            ORDER BY email
            "#,
        )
        .bind(inbound_id)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_client).collect())
    }

    async fn upsert_traffic(&self, traffic: ClientTraffic) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO client_traffics (inbound_id, email, up_bytes, down_bytes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (inbound_id, email) DO UPDATE SET
                up_bytes = EXCLUDED.up_bytes,
                down_bytes = EXCLUDED.down_bytes
            "#,
        )
        .bind(traffic.inbound_id)
        .bind(&traffic.email)
        .bind(traffic.up_bytes)
        .bind(traffic.down_bytes)
        .execute(&self.write_pool)
        .await?;

        Ok(())
    }

    async fn get_traffic(&self, inbound_id: i64, email: &str) -> DbResult<Option<ClientTraffic>> {
        let row = sqlx::query(
            r#"
            SELECT inbound_id, email, up_bytes, down_bytes
            FROM client_traffics
            WHERE inbound_id = $1 AND email = $2
            "#,
        )
        .bind(inbound_id)
        .bind(email)
        .fetch_optional(&self.read_pool)
        .await?;

        Ok(row.map(|row| ClientTraffic {
            inbound_id: row.get("inbound_id"),
            email: row.get("email"),
            up_bytes: row.get("up_bytes"),
            down_bytes: row.get("down_bytes"),
        }))
    }

    async fn list_depleted(&self, expiry_limit_ms: i64) -> DbResult<Vec<ClientUsage>> {
        // Deletion candidates come from the primary; a replica may still list
        // clients that a previous run already removed.
        let rows = sqlx::query(
            r#"
            SELECT c.inbound_id, c.email, c.enable, c.total_bytes, c.expiry_time,
                   t.up_bytes, t.down_bytes
            FROM clients c
            JOIN client_traffics t
              ON t.inbound_id = c.inbound_id AND t.email = c.email
            WHERE c.enable
              AND (
                (c.total_bytes > 0 AND t.up_bytes >= c.total_bytes - t.down_bytes)
                OR (c.expiry_time <> 0 AND c.expiry_time < $1)
              )
            ORDER BY c.inbound_id, c.email
            "#,
        )
        .bind(expiry_limit_ms)
        .fetch_all(&self.write_pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ClientUsage {
                inbound_id: row.get("inbound_id"),
                email: row.get("email"),
                enabled: row.get("enable"),
                total_bytes: row.get("total_bytes"),
                expiry_time: row.get("expiry_time"),
                up_bytes: row.get("up_bytes"),
                down_bytes: row.get("down_bytes"),
            })
            .collect())
    }

    async fn delete_client(&self, inbound_id: i64, email: &str) -> DbResult<()> {
        let mut tx = self.write_pool.begin().await?;

        let result = sqlx::query("DELETE FROM clients WHERE inbound_id = $1 AND email = $2")
            .bind(inbound_id)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        sqlx::query("DELETE FROM client_traffics WHERE inbound_id = $1 AND email = $2")
            .bind(inbound_id)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
