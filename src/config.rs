//! Configuration management for the cupchain mining client
//!
//! Supports configuration via command line arguments, environment variables,
//! and configuration files (YAML/JSON) with validation and defaults. The
//! configuration is built once at startup and passed to each component; no
//! component reads ambient global state.

use crate::types::{Address, Difficulty};
use crate::{Error, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Complete configuration for the mining client
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "cupchain-mining-client",
    version = env!("CARGO_PKG_VERSION"),
    about = "Cupchain Mining Client",
    long_about = "A proof-of-work mining client for the Cupchain network with parallel CPU \
                  workers and a local balance ledger"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Address credited with mining rewards
    #[arg(short = 'm', long, env = "CUPCHAIN_MINER_ADDRESS")]
    pub miner_address: Option<String>,

    /// Sentinel sender address for protocol issuance, exempt from balance checks
    #[arg(long, default_value = "cup-reward")]
    #[serde(default = "default_reward_address")]
    pub reward_address: String,

    /// Mining difficulty (leading zero hex characters required of a block hash)
    #[arg(short = 'd', long, default_value = "4")]
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,

    /// Pause between mining rounds in milliseconds
    #[arg(short = 'i', long, default_value = "10000")]
    #[serde(default = "default_mining_interval")]
    pub mining_interval: u64,

    /// Fraction of available CPU cores to use for nonce search (0, 1]
    #[arg(short = 'u', long, default_value = "0.75")]
    #[serde(default = "default_cpu_utilization")]
    pub cpu_utilization: f64,

    /// Chain authority address (host:port)
    #[arg(short = 'n', long, default_value = "localhost:3001")]
    #[serde(default = "default_node")]
    pub node: String,

    /// Hash-rate metrics endpoint address (host:port)
    #[arg(long, default_value = "localhost:3030")]
    #[serde(default = "default_metrics_node")]
    pub metrics_node: String,

    /// External ledger mirror endpoint (optional)
    #[arg(long)]
    pub mirror_url: Option<String>,

    /// Use TLS to connect to the authority and metrics endpoints
    #[arg(short = 't', long)]
    #[serde(default)]
    pub tls: bool,

    /// Directory for the cached chain snapshot
    #[arg(long, default_value = "chaindata")]
    #[serde(default = "default_chain_cache_dir")]
    pub chain_cache_dir: PathBuf,

    /// Path of the balance ledger snapshot file
    #[arg(long, default_value = "balance/accounts.json")]
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,

    /// HTTP timeout in milliseconds
    #[arg(long, default_value = "30000")]
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Maximum retry attempts for block submission
    #[arg(long, default_value = "5")]
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base submission retry delay in milliseconds
    #[arg(long, default_value = "3000")]
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Maximum submission retry delay in milliseconds
    #[arg(long, default_value = "30000")]
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,

    /// How long an accepted block hash stays in the dedup window, in seconds
    #[arg(long, default_value = "600")]
    #[serde(default = "default_dedup_window")]
    pub dedup_window: u64,

    /// Maximum number of hashes kept in the dedup window
    #[arg(long, default_value = "64")]
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Config {
    /// Load configuration from CLI arguments and an optional config file
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // Default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config (CLI takes precedence)
    fn merge_with_file(mut self, file_config: Self) -> Result<Self> {
        if self.miner_address.is_none() {
            self.miner_address = file_config.miner_address;
        }

        if self.mirror_url.is_none() {
            self.mirror_url = file_config.mirror_url;
        }

        // For other fields, keep CLI values (they include defaults)
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Difficulty::new(self.difficulty)?;

        if !(self.cpu_utilization > 0.0 && self.cpu_utilization <= 1.0) {
            return Err(Error::config(
                "CPU utilization must be within (0, 1]".to_string(),
            ));
        }

        Url::parse(&self.authority_url())
            .map_err(|e| Error::config(format!("Invalid authority URL: {}", e)))?;
        Url::parse(&self.metrics_url())
            .map_err(|e| Error::config(format!("Invalid metrics URL: {}", e)))?;

        if let Some(mirror) = &self.mirror_url {
            Url::parse(mirror).map_err(|e| Error::config(format!("Invalid mirror URL: {}", e)))?;
        }

        if self.max_retry_delay < self.retry_delay {
            return Err(Error::config(
                "Maximum retry delay must not be below the base retry delay",
            ));
        }

        Ok(())
    }

    /// Get the parsed difficulty
    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(self.difficulty)
    }

    /// Get the miner reward address, required for mining
    pub fn miner_address(&self) -> Result<Address> {
        self.miner_address
            .as_deref()
            .map(Address::new)
            .ok_or_else(|| {
                Error::config("Miner address is required. Use --miner-address or a config file")
            })
    }

    /// Get the reward sentinel address
    pub fn reward_address(&self) -> Address {
        Address::new(self.reward_address.clone())
    }

    /// Number of parallel search workers: ceil(available cores x utilization)
    pub fn worker_count(&self) -> usize {
        let cores = num_cpus::get();
        ((cores as f64 * self.cpu_utilization).ceil() as usize).max(1)
    }

    /// Get the chain authority base URL
    pub fn authority_url(&self) -> String {
        if self.tls {
            format!("https://{}", self.node)
        } else {
            format!("http://{}", self.node)
        }
    }

    /// Get the metrics endpoint base URL
    pub fn metrics_url(&self) -> String {
        if self.tls {
            format!("https://{}", self.metrics_node)
        } else {
            format!("http://{}", self.metrics_node)
        }
    }

    /// Get the chain snapshot cache file path
    pub fn chain_cache_file(&self) -> PathBuf {
        self.chain_cache_dir.join("blockchain.json")
    }

    /// Get the pause between mining rounds
    pub fn mining_interval_duration(&self) -> Duration {
        Duration::from_millis(self.mining_interval)
    }

    /// Get the HTTP timeout duration
    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    /// Get the base retry delay duration
    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    /// Get the max retry delay duration
    pub fn max_retry_delay_duration(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay)
    }

    /// Get the dedup window duration
    pub fn dedup_window_duration(&self) -> Duration {
        Duration::from_secs(self.dedup_window)
    }
}

// Default value functions for serde
fn default_reward_address() -> String {
    "cup-reward".to_string()
}
fn default_difficulty() -> u32 {
    4
}
fn default_mining_interval() -> u64 {
    10_000
}
fn default_cpu_utilization() -> f64 {
    0.75
}
fn default_node() -> String {
    "localhost:3001".to_string()
}
fn default_metrics_node() -> String {
    "localhost:3030".to_string()
}
fn default_chain_cache_dir() -> PathBuf {
    PathBuf::from("chaindata")
}
fn default_ledger_file() -> PathBuf {
    PathBuf::from("balance/accounts.json")
}
fn default_http_timeout() -> u64 {
    30_000
}
fn default_max_retries() -> usize {
    5
}
fn default_retry_delay() -> u64 {
    3_000
}
fn default_max_retry_delay() -> u64 {
    30_000
}
fn default_dedup_window() -> u64 {
    600
}
fn default_dedup_capacity() -> usize {
    64
}
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(["cupchain-mining-client"]).unwrap();

        assert_eq!(config.difficulty, 4);
        assert_eq!(config.mining_interval, 10_000);
        assert_eq!(config.cpu_utilization, 0.75);
        assert_eq!(config.reward_address, "cup-reward");
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.tls);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_count_at_least_one() {
        let config = Config::try_parse_from([
            "cupchain-mining-client",
            "--cpu-utilization",
            "0.01",
        ])
        .unwrap();
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config =
            Config::try_parse_from(["cupchain-mining-client", "--difficulty", "0"]).unwrap();
        assert!(config.validate().is_err());

        let config =
            Config::try_parse_from(["cupchain-mining-client", "--cpu-utilization", "1.5"])
                .unwrap();
        assert!(config.validate().is_err());

        let config = Config::try_parse_from([
            "cupchain-mining-client",
            "--retry-delay",
            "5000",
            "--max-retry-delay",
            "1000",
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_miner_address_required() {
        let config = Config::try_parse_from(["cupchain-mining-client"]).unwrap();
        assert!(config.miner_address().is_err());

        let config = Config::try_parse_from([
            "cupchain-mining-client",
            "--miner-address",
            "cup1miner",
        ])
        .unwrap();
        assert_eq!(config.miner_address().unwrap().as_str(), "cup1miner");
    }

    #[test]
    fn test_authority_url_scheme() {
        let config = Config::try_parse_from(["cupchain-mining-client"]).unwrap();
        assert_eq!(config.authority_url(), "http://localhost:3001");

        let config = Config::try_parse_from(["cupchain-mining-client", "--tls"]).unwrap();
        assert_eq!(config.authority_url(), "https://localhost:3001");
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let yaml_content = r#"
miner_address: "cup1q7f3a"
node: "authority.example.com:3001"
difficulty: 5
cpu_utilization: 0.5
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_file(&temp_file.path().to_path_buf())
            .await
            .unwrap();

        assert_eq!(config.miner_address.unwrap(), "cup1q7f3a");
        assert_eq!(config.node, "authority.example.com:3001");
        assert_eq!(config.difficulty, 5);
        assert_eq!(config.cpu_utilization, 0.5);
    }
}
