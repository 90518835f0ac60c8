use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateInbound, Inbound},
};

#[async_trait]
pub trait InboundRepo: Send + Sync {
    async fn create(&self, input: CreateInbound) -> DbResult<Inbound>;
    async fn get_by_id(&self, id: i64) -> DbResult<Option<Inbound>>;
    /// List all inbounds ordered by id.
    async fn list(&self) -> DbResult<Vec<Inbound>>;
}
