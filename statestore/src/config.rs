use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAME: &str = "default";
pub const DEFAULT_TABLE_NAME: &str = "orbit";

/// Configuration of a [`Storage`](crate::storage::Storage).
///
/// Every field has a default, so a partial document deserializes fine:
///
/// ```
/// use statestore::config::StorageConfig;
///
/// let cfg: StorageConfig = serde_json::from_str(r#"{ "default_table_name": "game" }"#).unwrap();
/// assert_eq!(cfg.default_table_name, "game");
/// assert_eq!(cfg.name, "default");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub name: String,
    pub default_table_name: String,
    pub provision: ProvisionConfig,
}

/// Table provisioning parameters.
///
/// The active-wait loop is a fixed `max_attempts` x `retry_delay_ms` bound with
/// no backoff; the defaults give roughly 40 seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub read_capacity: u64,
    pub write_capacity: u64,
}

// Implementations

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_default_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.default_table_name = table_name.into();
        self
    }

    pub fn with_provision(mut self, provision: ProvisionConfig) -> Self {
        self.provision = provision;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            default_table_name: DEFAULT_TABLE_NAME.to_string(),
            provision: ProvisionConfig::default(),
        }
    }
}

impl ProvisionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 66,
            retry_delay_ms: 600,
            read_capacity: 1,
            write_capacity: 1,
        }
    }
}
