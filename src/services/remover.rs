use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::regenerate::{ConfigRegenerator, RegenerateError};
use crate::db::{ClientRepo, DbError};

#[derive(Debug, Error)]
pub enum RemoveError {
    #[error("Failed to delete client: {0}")]
    Store(#[from] DbError),

    #[error("Client deleted but proxy config regeneration failed: {0}")]
    Regenerate(#[from] RegenerateError),
}

/// Removes clients from an inbound and pushes the change to the proxy core.
#[derive(Clone)]
pub struct ClientRemover {
    clients: Arc<dyn ClientRepo>,
    regenerator: Arc<dyn ConfigRegenerator>,
}

impl ClientRemover {
    pub fn new(clients: Arc<dyn ClientRepo>, regenerator: Arc<dyn ConfigRegenerator>) -> Self {
        Self {
            clients,
            regenerator,
        }
    }

    /// Delete one client (and its traffic row) from one inbound, then
    /// regenerate the proxy configuration.
    ///
    /// The regeneration hook runs exactly once per successful delete and the
    /// removal only counts as complete once it returns. A delete that fails
    /// leaves the store untouched and never triggers regeneration.
    pub async fn remove_client(&self, inbound_id: i64, email: &str) -> Result<(), RemoveError> {
        self.clients.delete_client(inbound_id, email).await?;
        debug!(inbound_id, email, "Client deleted, regenerating proxy config");
        self.regenerator.regenerate().await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        db::tests::harness::create_sqlite_db,
        models::{CreateClient, CreateInbound},
        services::RegenerateResult,
    };

    #[derive(Default)]
    struct CountingRegenerator {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ConfigRegenerator for CountingRegenerator {
        async fn regenerate(&self) -> RegenerateResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RegenerateError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    async fn seeded_inbound(db: &crate::db::DbPool) -> i64 {
        let inbound = db
            .inbounds()
            .create(CreateInbound {
                tag: "in".to_string(),
                protocol: "vless".to_string(),
                port: 443,
            })
            .await
            .unwrap();
        db.clients()
            .create_client(CreateClient {
                inbound_id: inbound.id,
                email: "a@example.com".to_string(),
                enabled: true,
                total_bytes: 0,
                expiry_time: 0,
            })
            .await
            .unwrap();
        inbound.id
    }

    #[tokio::test]
    async fn test_remove_client_regenerates_once() {
        let db = create_sqlite_db().await;
        let inbound_id = seeded_inbound(&db).await;
        let regenerator = Arc::new(CountingRegenerator::default());
        let remover = ClientRemover::new(db.clients(), regenerator.clone());

        remover
            .remove_client(inbound_id, "a@example.com")
            .await
            .unwrap();

        assert_eq!(regenerator.calls.load(Ordering::SeqCst), 1);
        assert!(
            db.clients()
                .get_client(inbound_id, "a@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_delete_skips_regeneration() {
        let db = create_sqlite_db().await;
        let inbound_id = seeded_inbound(&db).await;
        let regenerator = Arc::new(CountingRegenerator::default());
        let remover = ClientRemover::new(db.clients(), regenerator.clone());

        let result = remover.remove_client(inbound_id, "ghost@example.com").await;

        assert!(matches!(result, Err(RemoveError::Store(DbError::NotFound))));
        assert_eq!(regenerator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_regeneration_failure_is_reported() {
        let db = create_sqlite_db().await;
        let inbound_id = seeded_inbound(&db).await;
        let regenerator = Arc::new(CountingRegenerator {
            fail: true,
            ..Default::default()
        });
        let remover = ClientRemover::new(db.clients(), regenerator);

        let result = remover.remove_client(inbound_id, "a@example.com").await;
        assert!(matches!(result, Err(RemoveError::Regenerate(_))));

        // The delete itself was committed
        assert!(
            db.clients()
                .get_client(inbound_id, "a@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }
}
