//! Configuration (SPEC_FULL.md §1): batch size, backoff bounds, and
//! command-drain limits loaded via the `config` crate with a TOML file
//! plus environment overlay, following the teacher's
//! `tasker_shared::config` / `orchestration::config` pattern of a small
//! typed struct sitting in front of a generic config builder.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferManagerConfig {
    /// Upper bound on processes pulled per state per tick (spec.md §6).
    pub batch_size: usize,
    /// Upper bound on commands drained per tick (spec.md §4.2 step 1).
    pub command_batch_size: usize,
    /// Starting backoff delay for `ExponentialBackoffWaitStrategy`.
    pub min_wait_millis: u64,
    /// Ceiling backoff delay for `ExponentialBackoffWaitStrategy`.
    pub max_wait_millis: u64,
}

impl Default for TransferManagerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            command_batch_size: 10,
            min_wait_millis: 100,
            max_wait_millis: 5_000,
        }
    }
}

impl TransferManagerConfig {
    /// Load configuration from an optional TOML file overlaid with
    /// `TRANSFER_MANAGER_*` environment variables (e.g.
    /// `TRANSFER_MANAGER_BATCH_SIZE=25`), falling back to defaults when
    /// neither is present. Reads a `.env` file first via `dotenvy`, the
    /// same way the teacher's binaries bootstrap local configuration.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TRANSFER_MANAGER").separator("_"),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = TransferManagerConfig::default();
        assert!(config.batch_size > 0);
        assert!(config.min_wait_millis <= config.max_wait_millis);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let config = TransferManagerConfig::load(Some("/nonexistent/path")).unwrap();
        assert_eq!(config.batch_size, TransferManagerConfig::default().batch_size);
    }
}
