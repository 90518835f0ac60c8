use serde::{Deserialize, Serialize};

/// A proxy listener configuration that owns a set of clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    pub id: i64,
    /// Unique listener tag, used as the inbound name in the proxy config.
    pub tag: String,
    pub protocol: String,
    pub port: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInbound {
    pub tag: String,
    pub protocol: String,
    pub port: i32,
}
