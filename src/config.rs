//! Configuration for the ledger service

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "LEDGER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// A SHA-256 hex digest has 64 characters
const MAX_DIFFICULTY: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Leading zero characters required in a block hash
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    /// Paid to the miner of each block
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_difficulty() -> usize {
    4
}

fn default_mining_reward() -> f64 {
    100.0
}

impl Config {
    /// Parses and validates a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file at `path`, falling back to defaults when the
    /// file does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".to_string()));
        }

        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "ledger.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.ledger.difficulty
            )));
        }

        if !self.ledger.mining_reward.is_finite() || self.ledger.mining_reward < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "ledger.mining_reward must be a non-negative number, got {}",
                self.ledger.mining_reward
            )));
        }

        Ok(())
    }
}

/// Loads the config from the path in `LEDGER_CONFIG`, or `config.toml`
pub fn load_config() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    Config::from_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ledger.difficulty, 4);
        assert_eq!(config.ledger.mining_reward, 100.0);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml(
            r#"
            [ledger]
            difficulty = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.difficulty, 1);
        assert_eq!(config.ledger.mining_reward, 100.0);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_toml("[ledger]\ndifficulty = 65"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[ledger]\nmining_reward = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[server]\nport = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[ledger]\nblock_size = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::from_file("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.ledger.difficulty, 4);
    }
}
