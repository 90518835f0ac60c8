//! Proxy configuration regeneration.
//!
//! After a client is removed from the store, the proxy core must be given a
//! configuration without that client. A [`ConfigRegenerator`] rebuilds that
//! configuration from the store.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::{
    config::ProxyConfig,
    db::{ClientRepo, DbError, DbPool, InboundRepo},
};

#[derive(Debug, Error)]
pub enum RegenerateError {
    #[error("Failed to write proxy config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to render proxy config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to load inbounds: {0}")]
    Store(#[from] DbError),
}

pub type RegenerateResult<T> = Result<T, RegenerateError>;

/// Rebuilds the proxy core's view of active clients.
#[async_trait]
pub trait ConfigRegenerator: Send + Sync {
    /// Regenerate the configuration from the current store contents.
    async fn regenerate(&self) -> RegenerateResult<()>;

    /// Backend name (for logging).
    fn backend_name(&self) -> &'static str;
}

/// Create the regenerator selected by `[proxy]`.
pub fn create_regenerator(config: &ProxyConfig, db: &DbPool) -> Arc<dyn ConfigRegenerator> {
    match &config.config_path {
        Some(path) => Arc::new(JsonConfigWriter::new(
            path.clone(),
            db.primary_inbounds(),
            db.primary_clients(),
        )),
        None => Arc::new(LogOnlyRegenerator),
    }
}

/// Rendered proxy configuration.
#[derive(Debug, Serialize)]
struct RenderedConfig {
    generated_at: DateTime<Utc>,
    inbounds: Vec<RenderedInbound>,
}

#[derive(Debug, Serialize)]
struct RenderedInbound {
    tag: String,
    protocol: String,
    port: i32,
    clients: Vec<RenderedClient>,
}

#[derive(Debug, Serialize)]
struct RenderedClient {
    email: String,
    total_bytes: i64,
    expiry_time: i64,
}

/// Writes every enabled inbound and its enabled clients to a JSON file the
/// proxy core watches.
pub struct JsonConfigWriter {
    path: PathBuf,
    inbounds: Arc<dyn InboundRepo>,
    clients: Arc<dyn ClientRepo>,
    /// Serializes writers so two regenerations never share the temp file.
    write_lock: Mutex<()>,
}

impl JsonConfigWriter {
    pub fn new(path: PathBuf, inbounds: Arc<dyn InboundRepo>, clients: Arc<dyn ClientRepo>) -> Self {
        Self {
            path,
            inbounds,
            clients,
            write_lock: Mutex::new(()),
        }
    }

    async fn render(&self) -> RegenerateResult<RenderedConfig> {
        let mut inbounds = Vec::new();
        for inbound in self.inbounds.list().await? {
            if !inbound.enabled {
                continue;
            }
            let clients = self
                .clients
                .list_inbound_clients(inbound.id)
                .await?
                .into_iter()
                .filter(|c| c.enabled)
                .map(|c| RenderedClient {
                    email: c.email,
                    total_bytes: c.total_bytes,
                    expiry_time: c.expiry_time,
                })
                .collect();
            inbounds.push(RenderedInbound {
                tag: inbound.tag,
                protocol: inbound.protocol,
                port: inbound.port,
                clients,
            });
        }

        Ok(RenderedConfig {
            generated_at: Utc::now(),
            inbounds,
        })
    }
}

#[async_trait]
impl ConfigRegenerator for JsonConfigWriter {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn regenerate(&self) -> RegenerateResult<()> {
        let _guard = self.write_lock.lock().await;

        let rendered = self.render().await?;
        let body = serde_json::to_vec_pretty(&rendered)?;

        // Write to a temp file first, then rename for atomicity. The name is
        // unique so writers in other processes never share it.
        let temp_path = self
            .path
            .with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, &body).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!(
            inbounds = rendered.inbounds.len(),
            bytes = body.len(),
            "Proxy config regenerated"
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json_file"
    }
}

/// Regenerator for deployments where the proxy core reads the store
/// directly. Only records that a regeneration was due.
pub struct LogOnlyRegenerator;

#[async_trait]
impl ConfigRegenerator for LogOnlyRegenerator {
    async fn regenerate(&self) -> RegenerateResult<()> {
        info!("Proxy config regeneration requested (no config_path configured)");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "log_only"
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;
    use crate::{
        db::tests::harness::create_sqlite_db,
        models::{CreateClient, CreateInbound},
    };

    async fn seed(db: &DbPool) -> (i64, i64) {
        let open = db
            .inbounds()
            .create(CreateInbound {
                tag: "vless-443".to_string(),
                protocol: "vless".to_string(),
                port: 443,
            })
            .await
            .unwrap();
        let second = db
            .inbounds()
            .create(CreateInbound {
                tag: "trojan-8443".to_string(),
                protocol: "trojan".to_string(),
                port: 8443,
            })
            .await
            .unwrap();

        for (inbound_id, email, enabled) in [
            (open.id, "alice@example.com", true),
            (open.id, "bob@example.com", false),
            (second.id, "carol@example.com", true),
        ] {
            db.clients()
                .create_client(CreateClient {
                    inbound_id,
                    email: email.to_string(),
                    enabled,
                    total_bytes: 0,
                    expiry_time: 0,
                })
                .await
                .unwrap();
        }
        (open.id, second.id)
    }

    fn emails(doc: &serde_json::Value, inbound: usize) -> Vec<String> {
        doc["inbounds"][inbound]["clients"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["email"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_json_writer_renders_enabled_clients() {
        let db = create_sqlite_db().await;
        seed(&db).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.json");

        let writer = JsonConfigWriter::new(path.clone(), db.inbounds(), db.clients());
        writer.regenerate().await.unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["inbounds"].as_array().unwrap().len(), 2);
        assert_eq!(doc["inbounds"][0]["tag"], "vless-443");
        assert_eq!(emails(&doc, 0), vec!["alice@example.com"]);
        assert_eq!(emails(&doc, 1), vec!["carol@example.com"]);
        // Only the rendered file is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_json_writer_reflects_removal() {
        let db = create_sqlite_db().await;
        let (_, second) = seed(&db).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.json");
        let writer = JsonConfigWriter::new(path.clone(), db.inbounds(), db.clients());
        writer.regenerate().await.unwrap();

        db.clients()
            .delete_client(second, "carol@example.com")
            .await
            .unwrap();
        writer.regenerate().await.unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(emails(&doc, 1).is_empty());
        assert_eq!(emails(&doc, 0), vec!["alice@example.com"]);
    }

    #[tokio::test]
    async fn test_json_writer_missing_directory_fails() {
        let db = create_sqlite_db().await;
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonConfigWriter::new(
            dir.path().join("missing").join("clients.json"),
            db.inbounds(),
            db.clients(),
        );

        assert!(matches!(
            writer.regenerate().await,
            Err(RegenerateError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_create_regenerator_selects_backend() {
        let db = create_sqlite_db().await;
        let log_only = create_regenerator(&ProxyConfig::default(), &db);
        assert_eq!(log_only.backend_name(), "log_only");

        let json = create_regenerator(
            &ProxyConfig {
                config_path: Some(PathBuf::from("/tmp/clients.json")),
            },
            &db,
        );
        assert_eq!(json.backend_name(), "json_file");
    }
}
