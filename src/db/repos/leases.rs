use async_trait::async_trait;

use crate::db::error::DbResult;

/// Lease name held for the duration of an auto-delete run.
pub const AUTO_DELETE_LEASE: &str = "auto_delete";

/// Named, expiring leases shared by every process using the store.
#[async_trait]
pub trait JobLeaseRepo: Send + Sync {
    /// Take or renew lease `name` for `holder` until `expires_at_ms`.
    ///
    /// Succeeds when the lease is free, expired at `now_ms`, or already held
    /// by `holder`. Returns `false` when another holder owns a live lease.
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        now_ms: i64,
        expires_at_ms: i64,
    ) -> DbResult<bool>;

    /// Release lease `name` if `holder` still owns it.
    async fn release(&self, name: &str, holder: &str) -> DbResult<()>;
}
