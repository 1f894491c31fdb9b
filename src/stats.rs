//! Hash-rate telemetry
//!
//! Aggregates per-worker search statistics after each round and posts the
//! total to the metrics endpoint. Best-effort only: a failed report is
//! logged by the caller and never retried.

use crate::client::AuthorityClient;
use crate::miner::RoundResult;
use crate::types::{format_hash_rate, Address};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Reports aggregate mining throughput to the metrics endpoint
pub struct HashRateReporter {
    authority: Arc<AuthorityClient>,
    miner_address: Address,
}

impl HashRateReporter {
    /// Create a reporter for the given miner address
    pub fn new(authority: Arc<AuthorityClient>, miner_address: Address) -> Self {
        Self {
            authority,
            miner_address,
        }
    }

    /// Sum the round's per-worker hash rates and post the total
    pub async fn report(&self, round: &RoundResult) -> Result<f64> {
        for (worker_id, stats) in round.stats.iter().enumerate() {
            debug!(
                worker_id,
                attempts = stats.attempts,
                elapsed_secs = stats.elapsed_secs,
                hash_rate = %format_hash_rate(stats.hash_rate),
                "Worker round statistics"
            );
        }

        let total = round.total_hash_rate();
        self.authority
            .report_hash_rate(&self.miner_address, total)
            .await?;

        info!(hash_rate = %format_hash_rate(total), "Hash rate reported");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use crate::miner::RoundResult;
    use crate::types::MiningStats;

    #[test]
    fn test_total_hash_rate_sums_workers() {
        let round = RoundResult {
            blocks: vec![],
            stats: vec![
                MiningStats::from_attempts(1_000, 2.0),
                MiningStats::from_attempts(3_000, 2.0),
            ],
        };

        assert_eq!(round.total_hash_rate(), 2_000.0);
    }

    #[test]
    fn test_total_hash_rate_empty_round() {
        let round = RoundResult {
            blocks: vec![],
            stats: vec![],
        };
        assert_eq!(round.total_hash_rate(), 0.0);
    }
}
