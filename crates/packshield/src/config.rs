//! Plugin configuration and logging setup.

use std::path::Path;

use packshield_protection::ProtectionConfig;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::ConfigError;

/// Log filter used when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Everything the plugin reads from its config file.
///
/// Loaded from JSON. Every field is optional; a missing field takes its
/// default, so `{}` is a valid config.
///
/// ```json
/// {
///   "protection": { "fallback_timeout": 600, "air_policy": "maintain" },
///   "detect_bridged_clients": false,
///   "log_filter": "packshield=debug"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    pub protection: ProtectionConfig,

    /// Skip players on bridged clients (which cannot apply Java resource
    /// packs). When `false` every joining player receives packs.
    pub detect_bridged_clients: bool,

    /// `tracing` filter directives, e.g. `"info,packshield_protection=debug"`.
    /// `RUST_LOG` takes precedence when set.
    pub log_filter: String,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            protection: ProtectionConfig::default(),
            detect_bridged_clients: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ShieldConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Fix out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.protection = self.protection.validated();
        if self.log_filter.trim().is_empty() {
            tracing::warn!(default = DEFAULT_LOG_FILTER, "empty log_filter, using default");
            self.log_filter = DEFAULT_LOG_FILTER.to_string();
        }
        self
    }
}

/// Installs a `tracing` fmt subscriber.
///
/// `RUST_LOG` wins over `filter` when it is set. Returns `Ok(false)` if a
/// global subscriber was already installed (by the host or an earlier
/// call); that is not an error.
pub fn init_tracing(filter: &str) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter).map_err(|e| ConfigError::InvalidLogFilter {
            filter: filter.to_string(),
            reason: e.to_string(),
        })?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();
    if !installed {
        tracing::debug!("tracing subscriber already installed, keeping it");
    }
    Ok(installed)
}
