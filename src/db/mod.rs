mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    inbounds: Arc<dyn InboundRepo>,
    clients: Arc<dyn ClientRepo>,
    settings: Arc<dyn SettingRepo>,
    leases: Arc<dyn JobLeaseRepo>,
    /// Inbound and client repos that never read from a replica.
    primary_inbounds: Arc<dyn InboundRepo>,
    primary_clients: Arc<dyn ClientRepo>,
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(sqlx::PgPool),
    #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
    _None(std::convert::Infallible),
}

/// Database pool supporting both SQLite and PostgreSQL.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let inbounds: Arc<dyn InboundRepo> = Arc::new(sqlite::SqliteInboundRepo::new(pool.clone()));
        let clients: Arc<dyn ClientRepo> = Arc::new(sqlite::SqliteClientRepo::new(pool.clone()));
        let repos = CachedRepos {
            primary_inbounds: Arc::clone(&inbounds),
            primary_clients: Arc::clone(&clients),
            inbounds,
            clients,
            settings: Arc::new(sqlite::SqliteSettingRepo::new(pool.clone())),
            leases: Arc::new(sqlite::SqliteJobLeaseRepo::new(pool.clone())),
        };
        DbPool {
            inner: PoolStorage::Sqlite(pool),
            repos,
        }
    }

    /// Create a DbPool from existing PostgreSQL pools.
    /// Primarily useful for testing.
    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(write_pool: sqlx::PgPool, read_pool: Option<sqlx::PgPool>) -> Self {
        let repos = CachedRepos {
            inbounds: Arc::new(postgres::PostgresInboundRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            clients: Arc::new(postgres::PostgresClientRepo::new(
                write_pool.clone(),
                read_pool,
            )),
            settings: Arc::new(postgres::PostgresSettingRepo::new(write_pool.clone())),
            leases: Arc::new(postgres::PostgresJobLeaseRepo::new(write_pool.clone())),
            primary_inbounds: Arc::new(postgres::PostgresInboundRepo::new(
                write_pool.clone(),
                None,
            )),
            primary_clients: Arc::new(postgres::PostgresClientRepo::new(
                write_pool.clone(),
                None,
            )),
        };
        DbPool {
            inner: PoolStorage::Postgres(write_pool),
            repos,
        }
    }

    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::Validation(
                "No [database] section configured".into(),
            )),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .foreign_keys(true)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                Ok(Self::from_sqlite(pool))
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let options = || {
                    sqlx::postgres::PgPoolOptions::new()
                        .min_connections(cfg.min_connections)
                        .max_connections(cfg.max_connections)
                        .acquire_timeout(std::time::Duration::from_secs(cfg.connect_timeout_secs))
                        .idle_timeout(std::time::Duration::from_secs(cfg.idle_timeout_secs))
                };

                let write_pool = options().connect(&cfg.url).await?;

                let read_pool = if let Some(read_url) = &cfg.read_url {
                    tracing::info!("Configuring read replica pool");
                    Some(options().connect(read_url).await?)
                } else {
                    None
                };

                Ok(Self::from_postgres(write_pool, read_pool))
            }
        }
    }

    /// Run database migrations using sqlx's migration runner
    /// This automatically creates and manages a _sqlx_migrations table
    /// Migrations always run on the primary (write) pool.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pool) => {
                tracing::info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations_sqlx/postgres").run(pool).await?;
                tracing::info!("PostgreSQL migrations completed successfully");
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    /// Get inbound repository
    pub fn inbounds(&self) -> Arc<dyn InboundRepo> {
        Arc::clone(&self.repos.inbounds)
    }

    /// Get client repository
    pub fn clients(&self) -> Arc<dyn ClientRepo> {
        Arc::clone(&self.repos.clients)
    }

    /// Get settings repository
    pub fn settings(&self) -> Arc<dyn SettingRepo> {
        Arc::clone(&self.repos.settings)
    }

    /// Get job lease repository
    pub fn leases(&self) -> Arc<dyn JobLeaseRepo> {
        Arc::clone(&self.repos.leases)
    }

    /// Inbound repository that reads from the primary even when a read
    /// replica is configured. Use it where a read must see a write that was
    /// just committed.
    pub fn primary_inbounds(&self) -> Arc<dyn InboundRepo> {
        Arc::clone(&self.repos.primary_inbounds)
    }

    /// Client repository that reads from the primary, see [`Self::primary_inbounds`].
    pub fn primary_clients(&self) -> Arc<dyn ClientRepo> {
        Arc::clone(&self.repos.primary_clients)
    }

    /// Close all connections, waiting for in-use connections to be returned.
    pub async fn close(&self) {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => pool.close().await,
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pool) => pool.close().await,
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }
}
