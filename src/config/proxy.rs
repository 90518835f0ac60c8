use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Proxy core integration.
///
/// After every client removal the active client set is re-rendered so the
/// proxy core stops accepting the removed credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// File the rendered client configuration is written to.
    /// When unset, regeneration is only logged.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.config_path
            && path.file_name().is_none()
        {
            return Err(ConfigError::Validation(format!(
                "proxy.config_path '{}' must name a file",
                path.display()
            )));
        }
        Ok(())
    }
}
