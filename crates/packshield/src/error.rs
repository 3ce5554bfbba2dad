//! Error types for the plugin boundary.
//!
//! The protection core has no error type: every operation on it is a
//! no-op when its preconditions do not hold. Errors only appear where the
//! plugin touches the outside world: reading its config file, and asking
//! other plugins whether a player is on a bridged client.

use std::path::PathBuf;

/// Failure to load or apply a [`ShieldConfig`](crate::ShieldConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON, or a field has the wrong type.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The log filter directive could not be parsed.
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

/// A [`ProbeStrategy`](crate::ProbeStrategy) could not answer.
///
/// The detector treats this as "unknown" and moves on to the next
/// strategy; it is only surfaced to the strategy's own logging.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The capability the strategy relies on is not installed.
    #[error("{strategy} is not available: {reason}")]
    Unavailable { strategy: String, reason: String },

    /// The capability is installed but the lookup failed.
    #[error("{strategy} lookup failed: {reason}")]
    Failed { strategy: String, reason: String },
}

/// Top-level error that wraps every PackShield error.
#[derive(Debug, thiserror::Error)]
pub enum ShieldError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The plugin was enabled on the current runtime outside of one.
    #[error("no Tokio runtime is available to drive protection timers")]
    NoRuntime,
}
