//! Node configuration.
//!
//! Settings come from an optional TOML file, then the command line, then
//! environment variables.

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Host this node is reachable at, used to skip itself in the neighbor list
    pub host: String,
    pub port: u16,
    pub environment: String,

    /// Static `host:port` list of peers
    pub neighbors: Vec<String>,

    /// Number of leading hex zeros a proof digest needs
    pub mining_difficulty: usize,

    /// Reserved sender identity of mining reward transactions
    pub mining_sender: String,
    pub mining_reward: f64,

    /// Auto-mining interval in seconds
    pub mining_timer_secs: u64,

    /// Per-request timeout for neighbor calls in seconds
    pub peer_timeout_secs: u64,

    /// Capacity of each per-neighbor outbound queue
    pub outbound_queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            host: "localhost".to_string(),
            port: 5000,
            environment: String::new(),
            neighbors: Vec::new(),
            mining_difficulty: 3,
            mining_sender: "THE_BLOCKCHAIN".to_string(),
            mining_reward: 1.0,
            mining_timer_secs: 10,
            peer_timeout_secs: 5,
            outbound_queue_capacity: 64,
        }
    }
}

impl NodeConfig {
    /// Reads `path` if it exists, otherwise starts from defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Ok(NodeConfig::default());
        }

        let contents = fs::read_to_string(path)?;
        NodeConfig::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides settings from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides settings from `lookup`, keyed by upper-case variable name.
    ///
    /// `PORT` is only honored when `ENVIRONMENT` is `production`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(environment) = lookup("ENVIRONMENT") {
            self.environment = environment;
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if self.environment == "production" {
            if let Some(port) = lookup("PORT") {
                self.port = parse("PORT", &port)?;
            }
        }
        if let Some(neighbors) = lookup("NEIGHBORS") {
            self.neighbors = neighbors
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(difficulty) = lookup("MINING_DIFFICULTY") {
            self.mining_difficulty = parse("MINING_DIFFICULTY", &difficulty)?;
        }
        if let Some(sender) = lookup("MINING_SENDER") {
            self.mining_sender = sender;
        }
        if let Some(reward) = lookup("MINING_REWARD") {
            self.mining_reward = parse("MINING_REWARD", &reward)?;
        }
        if let Some(timer) = lookup("MINING_TIMER") {
            self.mining_timer_secs = parse("MINING_TIMER", &timer)?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mining_sender.is_empty() {
            return Err(invalid("mining_sender", ""));
        }
        if !self.mining_reward.is_finite() || self.mining_reward <= 0.0 {
            return Err(invalid("mining_reward", self.mining_reward));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(invalid("outbound_queue_capacity", 0));
        }
        if self.mining_timer_secs == 0 {
            return Err(invalid("mining_timer_secs", 0));
        }
        Ok(())
    }

    /// `host:port` this node is known as by its neighbors
    pub fn self_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured neighbors, excluding this node
    pub fn remote_neighbors(&self) -> Vec<String> {
        let me = self.self_address();
        self.neighbors
            .iter()
            .filter(|neighbor| {
                let bare = neighbor
                    .trim_start_matches("http://")
                    .trim_start_matches("https://")
                    .trim_end_matches('/');
                bare != me
            })
            .cloned()
            .collect()
    }

    pub fn mining_interval(&self) -> Duration {
        Duration::from_secs(self.mining_timer_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();

        assert_eq!(config.mining_difficulty, 3);
        assert_eq!(config.mining_sender, "THE_BLOCKCHAIN");
        assert_eq!(config.mining_reward, 1.0);
        assert_eq!(config.mining_interval(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
            port = 5001
            neighbors = ["localhost:5000", "localhost:5001", "localhost:5002"]
            mining_difficulty = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 5001);
        assert_eq!(config.mining_difficulty, 4);
        assert_eq!(config.host, "localhost");
        assert_eq!(
            config.remote_neighbors(),
            vec!["localhost:5000".to_string(), "localhost:5002".to_string()]
        );
    }

    #[test]
    fn test_remote_neighbors_ignores_scheme() {
        let config = NodeConfig {
            neighbors: vec!["http://localhost:5000/".to_string(), "peer:5000".to_string()],
            ..NodeConfig::default()
        };

        assert_eq!(config.remote_neighbors(), vec!["peer:5000".to_string()]);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NodeConfig::default();
        config
            .apply_overrides(lookup(&[
                ("NEIGHBORS", "a:1, b:2,,"),
                ("MINING_DIFFICULTY", "2"),
                ("MINING_REWARD", "2.5"),
                ("PORT", "7000"),
            ]))
            .unwrap();

        assert_eq!(config.neighbors, vec!["a:1".to_string(), "b:2".to_string()]);
        assert_eq!(config.mining_difficulty, 2);
        assert_eq!(config.mining_reward, 2.5);
        // PORT is ignored outside production
        assert_eq!(config.port, 5000);

        config
            .apply_overrides(lookup(&[("ENVIRONMENT", "production"), ("PORT", "7000")]))
            .unwrap();
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = NodeConfig::default();
        let result = config.apply_overrides(lookup(&[("MINING_DIFFICULTY", "lots")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        assert!(NodeConfig::from_toml_str("mining_reward = 0.0").is_err());
        assert!(NodeConfig::from_toml_str("port = \"abc\"").is_err());
    }
}
