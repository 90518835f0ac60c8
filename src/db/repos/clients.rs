use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{Client, ClientTraffic, ClientUsage, CreateClient},
};

#[async_trait]
pub trait ClientRepo: Send + Sync {
    /// Add a client to an inbound.
    /// Returns `Conflict` if the email is already used in that inbound.
    async fn create_client(&self, input: CreateClient) -> DbResult<Client>;

    async fn get_client(&self, inbound_id: i64, email: &str) -> DbResult<Option<Client>>;

    /// List the clients of one inbound, ordered by email.
    async fn list_inbound_clients(&self, inbound_id: i64) -> DbResult<Vec<Client>>;

    /// Insert or replace the traffic counters of a client.
    async fn upsert_traffic(&self, traffic: ClientTraffic) -> DbResult<()>;

    async fn get_traffic(&self, inbound_id: i64, email: &str) -> DbResult<Option<ClientTraffic>>;

    /// List enabled clients that have a traffic row and either exhausted a
    /// non-zero quota (`up + down >= total`) or expired strictly before
    /// `expiry_limit_ms`.
    ///
    /// Clients are joined to their traffic row on `(inbound_id, email)`; a
    /// client without a traffic row is never returned. Results are ordered
    /// by inbound id, then email.
    async fn list_depleted(&self, expiry_limit_ms: i64) -> DbResult<Vec<ClientUsage>>;

    /// Delete a client and its traffic row from a single inbound.
    ///
    /// Clients with the same email in other inbounds are left untouched.
    /// Returns `NotFound` if the inbound has no such client.
    async fn delete_client(&self, inbound_id: i64, email: &str) -> DbResult<()>;
}
