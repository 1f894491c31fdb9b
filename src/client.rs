//! HTTP client for the chain authority and metrics endpoints
//!
//! All network calls the miner performs go through here: tip fetch, chain
//! snapshot download, block submission, and hash-rate reporting. Submission
//! retries with bounded exponential backoff; everything else is a single
//! attempt whose failure the caller decides how to absorb.

use crate::config::Config;
use crate::ledger::LedgerMirror;
use crate::types::{Address, ChainTip, MinedBlock};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

/// Exponential backoff configuration for block submission
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 5,
        }
    }
}

impl BackoffConfig {
    /// Build from the process configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_delay: config.retry_delay_duration(),
            max_delay: config.max_retry_delay_duration(),
            multiplier: 2.0,
            max_retries: config.max_retries,
        }
    }

    /// Next delay after `delay`, capped at the configured maximum
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64)
            .min(self.max_delay)
    }
}

/// Client for the chain authority and the hash-rate metrics endpoint
pub struct AuthorityClient {
    client: Client,
    authority_url: Url,
    metrics_url: Url,
    backoff: BackoffConfig,
}

impl AuthorityClient {
    /// Create a new client from the process configuration
    pub fn new(config: &Config) -> Result<Self> {
        let authority_url = Url::parse(&config.authority_url())
            .map_err(|e| Error::config(format!("Invalid authority URL: {}", e)))?;
        let metrics_url = Url::parse(&config.metrics_url())
            .map_err(|e| Error::config(format!("Invalid metrics URL: {}", e)))?;

        let client = ClientBuilder::new()
            .timeout(config.http_timeout_duration())
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            client,
            authority_url,
            metrics_url,
            backoff: BackoffConfig::from_config(config),
        })
    }

    /// Override the backoff configuration
    pub fn with_backoff_config(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    fn authority_endpoint(&self, path: &str) -> Result<Url> {
        self.authority_url
            .join(path)
            .map_err(|e| Error::authority(format!("Failed to build {} URL: {}", path, e)))
    }

    /// Fetch the current tip of the canonical chain
    pub async fn get_latest_block(&self) -> Result<ChainTip> {
        let url = self.authority_endpoint("latest-block")?;
        debug!("Fetching latest block from {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::authority(format!(
                "Failed to fetch latest block: HTTP {}",
                response.status()
            )));
        }

        let tip: ChainTip = response
            .json()
            .await
            .map_err(|e| Error::authority(format!("Failed to parse latest block: {}", e)))?;

        debug!(index = tip.index, hash = %tip.hash, "Received chain tip");
        Ok(tip)
    }

    /// Fetch the full chain snapshot, verbatim
    pub async fn get_chain_snapshot(&self) -> Result<Vec<u8>> {
        let url = self.authority_endpoint("blockchain")?;
        debug!("Fetching chain snapshot from {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::authority(format!(
                "Failed to fetch chain snapshot: HTTP {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Submit a mined block, retrying with bounded exponential backoff.
    ///
    /// Returns `Ok(())` on acceptance. A response the authority refuses for
    /// the whole retry budget (a sibling block already accepted at this
    /// height, typically) surfaces as `Error::Submit` after the last attempt.
    pub async fn submit_block(&self, block: &MinedBlock) -> Result<()> {
        let url = self.authority_endpoint("submit-block")?;
        let body = serde_json::json!({ "block": block });

        let mut delay = self.backoff.initial_delay;
        let mut attempts = 0;

        loop {
            let outcome = self.client.post(url.clone()).json(&body).send().await;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    info!(hash = %block.hash, "Block accepted by chain authority");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        hash = %block.hash,
                        status = %response.status(),
                        "Block submission refused"
                    );
                }
                Err(e) => {
                    warn!(hash = %block.hash, error = %e, "Block submission failed");
                }
            }

            if attempts >= self.backoff.max_retries {
                return Err(Error::submit(format!(
                    "Gave up submitting block {} after {} attempts",
                    block.hash,
                    attempts + 1
                )));
            }

            debug!(
                "Retrying submission in {:?} (attempt {}/{})",
                delay,
                attempts + 1,
                self.backoff.max_retries
            );
            sleep(delay).await;
            delay = self.backoff.next_delay(delay);
            attempts += 1;
        }
    }

    /// Report aggregate hash rate to the metrics endpoint, single attempt
    pub async fn report_hash_rate(&self, miner_address: &Address, hash_rate: f64) -> Result<()> {
        let url = self
            .metrics_url
            .join("submit-hashrate")
            .map_err(|e| Error::authority(format!("Failed to build hashrate URL: {}", e)))?;

        let body = serde_json::json!({
            "minerAddress": miner_address,
            "hashRate": hash_rate,
        });

        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::authority(format!(
                "Metrics endpoint refused hash rate: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Ledger mirror backed by the remote ledger-mirroring service
pub struct HttpLedgerMirror {
    client: Client,
    url: Url,
}

impl HttpLedgerMirror {
    /// Create a mirror client for the given endpoint
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url =
            Url::parse(url).map_err(|e| Error::config(format!("Invalid mirror URL: {}", e)))?;
        let client = ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl LedgerMirror for HttpLedgerMirror {
    async fn mirror_transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<()> {
        let body = serde_json::json!({
            "from": from,
            "to": to,
            "amount": amount,
        });

        let response = self.client.post(self.url.clone()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::ledger(format!(
                "Mirror service refused transfer: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn test_config() -> Config {
        Config::try_parse_from(["cupchain-mining-client"]).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = AuthorityClient::new(&test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn test_backoff_from_config() {
        let backoff = BackoffConfig::from_config(&test_config());
        assert_eq!(backoff.initial_delay, Duration::from_secs(3));
        assert_eq!(backoff.max_retries, 5);
    }

    #[test]
    fn test_backoff_delay_growth_is_capped() {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            max_retries: 5,
        };

        let d1 = backoff.next_delay(backoff.initial_delay);
        let d2 = backoff.next_delay(d1);
        let d3 = backoff.next_delay(d2);

        assert_eq!(d1, Duration::from_millis(200));
        assert_eq!(d2, Duration::from_millis(350)); // Capped
        assert_eq!(d3, Duration::from_millis(350));
    }

    #[test]
    fn test_endpoint_joining() {
        let client = AuthorityClient::new(&test_config()).unwrap();
        let url = client.authority_endpoint("latest-block").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/latest-block");
    }

    #[test]
    fn test_mirror_creation() {
        assert!(HttpLedgerMirror::new("http://localhost:4000/transfer", Duration::from_secs(5)).is_ok());
        assert!(HttpLedgerMirror::new("not a url", Duration::from_secs(5)).is_err());
    }
}
