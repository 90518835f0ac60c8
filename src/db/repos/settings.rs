use async_trait::async_trait;

use crate::db::error::{DbError, DbResult};

/// Settings key holding the number of days a depleted or expired client is
/// kept before the auto-delete job removes it.
pub const AUTO_DELETE_DAYS_KEY: &str = "auto_delete_days";

/// Key/value store for panel-wide settings.
#[async_trait]
pub trait SettingRepo: Send + Sync {
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> DbResult<()>;

    /// Read the auto-delete threshold in days. A missing setting means 0
    /// (feature disabled).
    async fn get_auto_delete_days(&self) -> DbResult<i64> {
        match self.get(AUTO_DELETE_DAYS_KEY).await? {
            Some(raw) => parse_auto_delete_days(&raw),
            None => Ok(0),
        }
    }

    async fn set_auto_delete_days(&self, days: i64) -> DbResult<()> {
        if days < 0 {
            return Err(DbError::Validation(format!(
                "{AUTO_DELETE_DAYS_KEY} cannot be negative (got {days})"
            )));
        }
        self.set(AUTO_DELETE_DAYS_KEY, &days.to_string()).await
    }
}

/// Parse a stored threshold value. Negative and non-numeric values are
/// rejected rather than clamped.
pub fn parse_auto_delete_days(raw: &str) -> DbResult<i64> {
    let days = raw.trim().parse::<i64>().map_err(|e| {
        DbError::Validation(format!("Invalid {AUTO_DELETE_DAYS_KEY} value '{raw}': {e}"))
    })?;
    if days < 0 {
        return Err(DbError::Validation(format!(
            "{AUTO_DELETE_DAYS_KEY} cannot be negative (got {days})"
        )));
    }
    Ok(days)
}
