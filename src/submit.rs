//! Block submission pipeline
//!
//! Validates, deduplicates, and submits mined blocks to the chain authority,
//! and relays accepted blocks to peers. Malformed blocks are dropped
//! permanently; hashes inside the recent-accept window are skipped without a
//! single network call; refused submissions ride the authority client's
//! bounded retry and end in a logged give-up rather than a crash.

use crate::client::AuthorityClient;
use crate::types::{MinedBlock, PeerMessage};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Outcome of a single submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The authority accepted the block and peers were notified
    Accepted,
    /// The block's hash is still inside the recent-accept window
    Duplicate,
    /// The block failed the structural check and was dropped
    Invalid,
    /// The retry budget ran out without an acceptance
    Rejected,
}

/// Channel for relaying messages to connected peers
#[async_trait]
pub trait PeerBroadcaster: Send + Sync {
    /// Send a message to every connected peer
    async fn broadcast(&self, message: &PeerMessage) -> Result<()>;
}

/// Broadcaster that only logs; the P2P transport is wired in externally
pub struct LogBroadcaster;

#[async_trait]
impl PeerBroadcaster for LogBroadcaster {
    async fn broadcast(&self, message: &PeerMessage) -> Result<()> {
        let PeerMessage::NewBlock(block) = message;
        info!(hash = %block.hash, "Relaying NEW_BLOCK to peers");
        Ok(())
    }
}

/// Bounded, time-windowed set of recently accepted block hashes
#[derive(Debug)]
pub struct RecentHashes {
    window: Duration,
    capacity: usize,
    entries: VecDeque<(String, Instant)>,
}

impl RecentHashes {
    /// Create a window with the given TTL and capacity
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Check whether a hash is still inside the window
    pub fn contains(&mut self, hash: &str) -> bool {
        self.prune();
        self.entries.iter().any(|(h, _)| h == hash)
    }

    /// Record an accepted hash, evicting the oldest entry at capacity
    pub fn insert(&mut self, hash: &str) {
        self.prune();
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((hash.to_string(), Instant::now()));
    }

    fn prune(&mut self) {
        let cutoff = Instant::now();
        while let Some((_, seen)) = self.entries.front() {
            if cutoff.duration_since(*seen) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of hashes currently remembered
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Submits mined blocks to the chain authority
pub struct SubmissionClient {
    authority: Arc<AuthorityClient>,
    broadcaster: Arc<dyn PeerBroadcaster>,
    recent: Mutex<RecentHashes>,
}

impl SubmissionClient {
    /// Create a submission client over the given authority connection
    pub fn new(
        authority: Arc<AuthorityClient>,
        broadcaster: Arc<dyn PeerBroadcaster>,
        dedup_window: Duration,
        dedup_capacity: usize,
    ) -> Self {
        Self {
            authority,
            broadcaster,
            recent: Mutex::new(RecentHashes::new(dedup_window, dedup_capacity)),
        }
    }

    /// Validate, deduplicate, and submit one mined block
    pub async fn submit(&self, block: &MinedBlock) -> Result<SubmitOutcome> {
        if let Some(problem) = structural_problem(block) {
            warn!(hash = %block.hash, problem, "Dropping structurally invalid block");
            return Ok(SubmitOutcome::Invalid);
        }

        if self.recent.lock().contains(&block.hash) {
            warn!(hash = %block.hash, "Block already accepted recently, skipping resubmission");
            return Ok(SubmitOutcome::Duplicate);
        }

        match self.authority.submit_block(block).await {
            Ok(()) => {
                self.remember_accepted(&block.hash);

                // Relay failure never undoes an acceptance
                let message = PeerMessage::NewBlock(block.clone());
                if let Err(e) = self.broadcaster.broadcast(&message).await {
                    warn!(hash = %block.hash, error = %e, "Peer broadcast failed");
                }

                Ok(SubmitOutcome::Accepted)
            }
            Err(Error::Submit { message }) => {
                error!(hash = %block.hash, "{}", message);
                Ok(SubmitOutcome::Rejected)
            }
            Err(e) => Err(e),
        }
    }

    /// Record a hash as accepted so the window refuses its resubmission
    pub fn remember_accepted(&self, hash: &str) {
        self.recent.lock().insert(hash);
    }
}

/// Structural check mirroring what the authority requires of a block.
///
/// Index, nonce, and the transaction sequence are well-formed by type; the
/// string fields are the ones that can arrive empty.
fn structural_problem(block: &MinedBlock) -> Option<&'static str> {
    if block.timestamp.is_empty() {
        Some("missing timestamp")
    } else if block.previous_hash.is_empty() {
        Some("missing previous hash")
    } else if block.hash.is_empty() {
        Some("missing hash")
    } else {
        None
    }
}
