//! Configuration for the ledger engine and the HTTP node

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Target time between two blocks, in milliseconds
pub const MINE_RATE: u64 = 1000;

/// Difficulty carried by the genesis block
pub const INITIAL_DIFFICULTY: u32 = 3;

/// Funds every address owns before it appears on chain
pub const STARTING_BALANCE: u64 = 1000;

/// Amount minted by a reward transaction
pub const MINING_REWARD: u64 = 50;

/// Most (tip hash, address) balances a node keeps memoised at once
pub const BALANCE_CACHE_CAPACITY: usize = 4096;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Protocol parameters that are allowed to differ between deployments.
///
/// Genesis fields are not part of this: every node must agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub mine_rate_ms: u64,
    pub starting_balance: u64,
    pub mining_reward: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            mine_rate_ms: MINE_RATE,
            starting_balance: STARTING_BALANCE,
            mining_reward: MINING_REWARD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
}

impl NodeConfig {
    /// Parses a TOML document, filling absent keys with defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the node configuration from `path`.
    ///
    /// A missing file is not an error: the defaults are returned instead.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(NodeConfig::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.mine_rate_ms == 0 {
            return Err(ConfigError::Invalid(
                "ledger.mine_rate_ms must be greater than zero".to_string(),
            ));
        }

        if self.server.host.is_empty() {
            return Err(ConfigError::Invalid("server.host must be set".to_string()));
        }

        Ok(())
    }
}
