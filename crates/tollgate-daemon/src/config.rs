//! Configuration file management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ledger node settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Seller identity and pricing.
    #[serde(default)]
    pub seller: SellerConfig,
    /// Sweep scheduling.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Ledger node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// `host:port` of the ledger node's RPC endpoint.
    #[serde(default = "default_ledger_endpoint")]
    pub endpoint: String,
    /// Per-call timeout in seconds.
    #[serde(default = "default_ledger_timeout")]
    pub timeout_secs: u64,
}

/// Seller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerConfig {
    /// Path to the hex-encoded signing key. Empty = $data_dir/seller.key.
    #[serde(default)]
    pub key_path: String,
    /// Base units charged per metered token.
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: u64,
}

/// Sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Auto-settle sweep interval in seconds.
    #[serde(default = "default_settle_interval")]
    pub settle_interval_secs: u64,
    /// Expire sweep interval in seconds.
    #[serde(default = "default_expire_interval")]
    pub expire_interval_secs: u64,
    /// Settle channels expiring within this many seconds.
    #[serde(default = "default_warning_window")]
    pub warning_window_secs: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_ledger_endpoint() -> String {
    "127.0.0.1:8114".to_string()
}

fn default_ledger_timeout() -> u64 {
    10
}

fn default_exchange_rate() -> u64 {
    tollgate_types::DEFAULT_EXCHANGE_RATE
}

fn default_settle_interval() -> u64 {
    60
}

fn default_expire_interval() -> u64 {
    600
}

fn default_warning_window() -> u64 {
    15 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ledger_endpoint(),
            timeout_secs: default_ledger_timeout(),
        }
    }
}

impl Default for SellerConfig {
    fn default() -> Self {
        Self {
            key_path: String::new(),
            exchange_rate: default_exchange_rate(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            settle_interval_secs: default_settle_interval(),
            expire_interval_secs: default_expire_interval(),
            warning_window_secs: default_warning_window(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Resolved seller key path.
    pub fn seller_key_path(&self) -> PathBuf {
        if self.seller.key_path.is_empty() {
            self.data_dir().join("seller.key")
        } else {
            PathBuf::from(&self.seller.key_path)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Default data directory, overridable via TOLLGATE_DATA_DIR.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TOLLGATE_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".tollgate"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/tollgate"))
    }
}
