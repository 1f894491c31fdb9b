//! Mining round coordination
//!
//! Drives one round of parallel nonce search: every worker thread receives
//! the same immutable template, searches its own slice of the nonce space,
//! and the first solution cancels the siblings cooperatively. Workers that
//! found a valid nonce before observing the cancellation still return it, so
//! a round can yield more than one block at the same height.

use crate::crypto::BlockHasher;
use crate::types::{BlockTemplate, MinedBlock, MiningStats};
use crate::{Error, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Nonces hashed between cancellation checks
const SEARCH_BATCH: u64 = 2_048;

/// Outcome of one mining round
#[derive(Debug)]
pub struct RoundResult {
    /// Every valid block found this round, in worker order
    pub blocks: Vec<MinedBlock>,
    /// One stats record per completed worker
    pub stats: Vec<MiningStats>,
}

impl RoundResult {
    /// Sum of per-worker hash rates
    pub fn total_hash_rate(&self) -> f64 {
        self.stats.iter().map(|s| s.hash_rate).sum()
    }
}

/// Coordinates the parallel nonce search for each round
pub struct MiningCoordinator {
    worker_count: usize,
}

impl MiningCoordinator {
    /// Create a coordinator with the given worker count
    pub fn new(worker_count: usize) -> Self {
        let worker_count = if worker_count == 0 {
            num_cpus::get()
        } else {
            worker_count
        };

        info!("Mining coordinator using {} search workers", worker_count);
        Self { worker_count }
    }

    /// Get the configured worker count
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Run one mining round over the given template
    pub async fn run_round(&self, template: BlockTemplate) -> Result<RoundResult> {
        self.run_round_with(template, CancellationToken::new()).await
    }

    /// Run one mining round, stopping early if `cancellation` fires
    pub async fn run_round_with(
        &self,
        template: BlockTemplate,
        cancellation: CancellationToken,
    ) -> Result<RoundResult> {
        let hasher = BlockHasher::for_template(&template)?;
        let template = Arc::new(template);

        debug!(
            index = template.index,
            difficulty = %template.difficulty,
            "Starting nonce search"
        );

        let mut handles = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let template = Arc::clone(&template);
            let hasher = hasher.clone();
            let cancellation = cancellation.clone();

            handles.push(task::spawn_blocking(move || {
                search_nonces(worker_id, &template, &hasher, &cancellation)
            }));
        }

        let mut blocks = Vec::new();
        let mut stats = Vec::new();

        // A failed worker fails the whole round; siblings that already
        // succeeded are discarded with it.
        for (worker_id, joined) in join_all(handles).await.into_iter().enumerate() {
            let (found, worker_stats) = joined
                .map_err(|e| Error::worker(worker_id, format!("search thread panicked: {}", e)))?;

            if let Some(block) = found {
                info!(
                    worker_id,
                    nonce = block.nonce,
                    hash = %block.hash,
                    "Worker found a valid nonce"
                );
                blocks.push(block);
            }
            stats.push(worker_stats);
        }

        let result = RoundResult { blocks, stats };
        info!(
            index = template.index,
            blocks = result.blocks.len(),
            hash_rate = %crate::types::format_hash_rate(result.total_hash_rate()),
            "Mining round finished"
        );

        Ok(result)
    }
}

/// Search one worker's slice of the nonce space.
///
/// Worker `i` starts at `i << 48`, giving each worker a disjoint 2^48 range.
/// The first solution cancels the shared token so siblings stop at their next
/// batch boundary.
fn search_nonces(
    worker_id: usize,
    template: &BlockTemplate,
    hasher: &BlockHasher,
    cancellation: &CancellationToken,
) -> (Option<MinedBlock>, MiningStats) {
    let mut nonce = (worker_id as u64) << 48;
    let mut attempts = 0u64;
    let start = Instant::now();

    loop {
        if cancellation.is_cancelled() {
            debug!(worker_id, attempts, "Search cancelled");
            break;
        }

        for _ in 0..SEARCH_BATCH {
            let hash = hasher.hash(nonce);
            attempts += 1;

            if template.difficulty.is_satisfied_by(&hash) {
                cancellation.cancel();
                let stats = MiningStats::from_attempts(attempts, start.elapsed().as_secs_f64());
                return (Some(template.seal(nonce, hash)), stats);
            }

            nonce = nonce.wrapping_add(1);
        }
    }

    let stats = MiningStats::from_attempts(attempts, start.elapsed().as_secs_f64());
    (None, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify_block;
    use crate::types::{ChainTip, Difficulty, Transaction};
    use std::collections::HashMap;

    fn easy_template() -> BlockTemplate {
        let tip = ChainTip {
            index: 7,
            hash: "00abcdef".to_string(),
            other: HashMap::new(),
        };
        BlockTemplate::next(
            &tip,
            vec![Transaction::new("alice", "bob", 12)],
            Difficulty::new(1).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_round_finds_valid_blocks() {
        let coordinator = MiningCoordinator::new(2);
        let template = easy_template();

        let result = coordinator.run_round(template.clone()).await.unwrap();

        assert!(!result.blocks.is_empty());
        assert_eq!(result.stats.len(), 2);
        for block in &result.blocks {
            assert_eq!(block.index, template.index);
            assert_eq!(block.previous_hash, template.previous_hash);
            assert!(block.difficulty.is_satisfied_by(&block.hash));
            assert!(verify_block(block).unwrap());
        }
    }

    #[tokio::test]
    async fn test_multiple_blocks_have_distinct_nonces() {
        let coordinator = MiningCoordinator::new(4);
        let result = coordinator.run_round(easy_template()).await.unwrap();

        let mut nonces: Vec<u64> = result.blocks.iter().map(|b| b.nonce).collect();
        nonces.sort_unstable();
        nonces.dedup();
        assert_eq!(nonces.len(), result.blocks.len());
    }

    #[tokio::test]
    async fn test_cancelled_round_returns_no_blocks() {
        let coordinator = MiningCoordinator::new(2);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = coordinator
            .run_round_with(easy_template(), cancellation)
            .await
            .unwrap();

        assert!(result.blocks.is_empty());
        assert_eq!(result.stats.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_count_attempts() {
        let coordinator = MiningCoordinator::new(1);
        let result = coordinator.run_round(easy_template()).await.unwrap();

        let stats = &result.stats[0];
        assert!(stats.attempts > 0);
        assert!(stats.hash_rate >= 0.0);
    }

    #[test]
    fn test_zero_worker_count_falls_back_to_cores() {
        let coordinator = MiningCoordinator::new(0);
        assert!(coordinator.worker_count() >= 1);
    }
}
