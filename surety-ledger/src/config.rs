//! Configuration for the surety ledger

use crate::types::{AccountId, ComponentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Account allowed to flip the operational switch and manage components
    pub owner: AccountId,

    /// Application component authorized at genesis
    pub app_component: ComponentId,

    /// Business policy
    pub policy: PolicyConfig,

    /// Genesis airline
    pub genesis: GenesisConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/surety"),
            service_name: "surety-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            owner: AccountId::new("owner"),
            app_component: ComponentId::new("surety-app"),
            policy: PolicyConfig::default(),
            genesis: GenesisConfig::default(),
            rocksdb: RocksDBConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// Business policy constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Cumulative deposit at which an airline becomes funded
    pub minimum_funding: Decimal,

    /// Maximum premium per policy
    pub premium_cap: Decimal,

    /// Payout multiplier applied to the premium on airline-fault delay
    pub payout_multiplier: Decimal,

    /// Exact fee an oracle pays to register
    pub oracle_registration_fee: Decimal,

    /// Agreeing responses needed to resolve a request
    pub oracle_quorum: usize,

    /// Oracle indexes are drawn from `0..oracle_index_range`
    pub oracle_index_range: u8,

    /// Below this many registered airlines, admission needs no votes
    pub direct_registration_limit: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            minimum_funding: Decimal::from(10),      // 10 units
            premium_cap: Decimal::ONE,               // 1 unit
            payout_multiplier: Decimal::new(15, 1),  // 1.5x
            oracle_registration_fee: Decimal::ONE,   // 1 unit
            oracle_quorum: 3,
            oracle_index_range: 10,
            direct_registration_limit: 4,
        }
    }
}

/// Genesis airline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// First airline, registered without votes
    pub airline: AccountId,

    /// Start the first airline as Funded instead of Registered
    pub prefunded: bool,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            airline: AccountId::new("airline-genesis"),
            prefunded: false,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Mailbox capacity (bounded for backpressure)
    pub mailbox_capacity: usize,

    /// Event broadcast buffer for subscribers
    pub event_buffer: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            event_buffer: 1024,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("SURETY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(owner) = std::env::var("SURETY_OWNER") {
            config.owner = AccountId::new(owner);
        }

        if let Ok(component) = std::env::var("SURETY_APP_COMPONENT") {
            config.app_component = ComponentId::new(component);
        }

        if let Ok(airline) = std::env::var("SURETY_GENESIS_AIRLINE") {
            config.genesis.airline = AccountId::new(airline);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check policy constants for consistency
    pub fn validate(&self) -> crate::Result<()> {
        let policy = &self.policy;

        if policy.minimum_funding <= Decimal::ZERO {
            return Err(crate::Error::Config("minimum_funding must be positive".to_string()));
        }
        if policy.premium_cap <= Decimal::ZERO {
            return Err(crate::Error::Config("premium_cap must be positive".to_string()));
        }
        if policy.payout_multiplier <= Decimal::ZERO {
            return Err(crate::Error::Config("payout_multiplier must be positive".to_string()));
        }
        if policy.oracle_quorum == 0 {
            return Err(crate::Error::Config("oracle_quorum must be at least 1".to_string()));
        }
        // Three distinct indexes must fit in the range
        if policy.oracle_index_range < 3 {
            return Err(crate::Error::Config(
                "oracle_index_range must be at least 3".to_string(),
            ));
        }
        if self.actor.mailbox_capacity == 0 || self.actor.event_buffer == 0 {
            return Err(crate::Error::Config("actor buffers must be non-zero".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "surety-ledger");
        assert_eq!(config.policy.minimum_funding, Decimal::from(10));
        assert_eq!(config.policy.oracle_quorum, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_narrow_index_range() {
        let mut config = Config::default();
        config.policy.oracle_index_range = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("surety.toml");
        let content = toml::to_string(&Config::default()).unwrap();
        std::fs::write(&path, content).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.app_component, ComponentId::new("surety-app"));
        assert_eq!(config.policy.payout_multiplier, Decimal::new(15, 1));
    }
}
