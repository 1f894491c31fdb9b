//! Core types for cupchain mining
//!
//! Fundamental types used throughout the mining client with proper validation
//! and JSON serialization matching the chain authority's wire format.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Account address on the cupchain network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create a new address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A value transfer between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(from: impl Into<Address>, to: impl Into<Address>, amount: u64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}

/// Mining difficulty: the number of leading zero hex characters a block hash
/// must carry to be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(u32);

impl Difficulty {
    /// Maximum meaningful difficulty for a 256-bit hex digest
    pub const MAX: u32 = 64;

    /// Create a new difficulty, rejecting values a 64-char digest can never satisfy
    pub fn new(level: u32) -> Result<Self> {
        if level == 0 || level > Self::MAX {
            return Err(Error::config(format!(
                "Difficulty must be between 1 and {}, got {}",
                Self::MAX,
                level
            )));
        }
        Ok(Self(level))
    }

    /// Get the difficulty level
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Check whether a hex hash string satisfies this difficulty
    pub fn is_satisfied_by(&self, hash: &str) -> bool {
        hash.len() >= self.0 as usize && hash.bytes().take(self.0 as usize).all(|b| b == b'0')
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let level: u32 = s
            .parse()
            .map_err(|e| Error::config(format!("Invalid difficulty: {}", e)))?;
        Self::new(level)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current tip of the canonical chain as reported by the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTip {
    pub index: u64,
    pub hash: String,
    #[serde(flatten)]
    pub other: HashMap<String, serde_json::Value>,
}

/// Candidate block contents, fixed for the duration of one mining round.
///
/// Every worker in a round receives a clone; only the nonce varies during the
/// search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: String,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub difficulty: Difficulty,
}

impl BlockTemplate {
    /// Build a template for the block following `tip`
    pub fn next(tip: &ChainTip, transactions: Vec<Transaction>, difficulty: Difficulty) -> Self {
        Self {
            index: tip.index + 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            transactions,
            previous_hash: tip.hash.clone(),
            difficulty,
        }
    }

    /// Attach a nonce and its hash, producing a sealed block
    pub fn seal(&self, nonce: u64, hash: String) -> MinedBlock {
        MinedBlock {
            index: self.index,
            timestamp: self.timestamp.clone(),
            transactions: self.transactions.clone(),
            previous_hash: self.previous_hash.clone(),
            difficulty: self.difficulty,
            nonce,
            hash,
        }
    }
}

/// A fully mined block ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedBlock {
    pub index: u64,
    pub timestamp: String,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub difficulty: Difficulty,
    pub nonce: u64,
    pub hash: String,
}

/// Per-worker search statistics for one mining round
#[derive(Debug, Clone, Copy, Default)]
pub struct MiningStats {
    /// Hashes per second over the worker's search
    pub hash_rate: f64,
    /// Nonces attempted
    pub attempts: u64,
    /// Wall-clock search time in seconds
    pub elapsed_secs: f64,
}

impl MiningStats {
    /// Compute stats from raw attempt counts
    pub fn from_attempts(attempts: u64, elapsed_secs: f64) -> Self {
        let hash_rate = if elapsed_secs > 0.0 {
            attempts as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            hash_rate,
            attempts,
            elapsed_secs,
        }
    }
}

/// Messages relayed to connected peers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PeerMessage {
    /// A freshly accepted block
    #[serde(rename = "NEW_BLOCK")]
    NewBlock(MinedBlock),
}

/// Format a hash rate as a human-readable string
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["H/s", "KH/s", "MH/s", "GH/s", "TH/s"];
    let mut rate = hashes_per_sec;
    let mut unit_index = 0;

    while rate >= 1000.0 && unit_index < UNITS.len() - 1 {
        rate /= 1000.0;
        unit_index += 1;
    }

    format!("{:.2} {}", rate, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_bounds() {
        assert!(Difficulty::new(0).is_err());
        assert!(Difficulty::new(65).is_err());
        assert_eq!(Difficulty::new(4).unwrap().value(), 4);
        assert_eq!("3".parse::<Difficulty>().unwrap().value(), 3);
        assert!("abc".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_difficulty_predicate() {
        let difficulty = Difficulty::new(3).unwrap();
        assert!(difficulty.is_satisfied_by("000abc"));
        assert!(difficulty.is_satisfied_by("0000"));
        assert!(!difficulty.is_satisfied_by("00a1"));
        assert!(!difficulty.is_satisfied_by("00"));
    }

    #[test]
    fn test_template_from_tip() {
        let tip = ChainTip {
            index: 41,
            hash: "00ffee".to_string(),
            other: HashMap::new(),
        };
        let template = BlockTemplate::next(&tip, vec![], Difficulty::new(2).unwrap());
        assert_eq!(template.index, 42);
        assert_eq!(template.previous_hash, "00ffee");
        assert!(template.transactions.is_empty());
    }

    #[test]
    fn test_block_wire_format_is_camel_case() {
        let tip = ChainTip {
            index: 0,
            hash: "genesis".to_string(),
            other: HashMap::new(),
        };
        let template = BlockTemplate::next(
            &tip,
            vec![Transaction::new("alice", "bob", 40)],
            Difficulty::new(2).unwrap(),
        );
        let block = template.seal(7, "00abc".to_string());
        let json = serde_json::to_value(&block).unwrap();

        assert_eq!(json["previousHash"], "genesis");
        assert_eq!(json["nonce"], 7);
        assert_eq!(json["transactions"][0]["from"], "alice");
    }

    #[test]
    fn test_peer_message_wire_format() {
        let tip = ChainTip {
            index: 0,
            hash: "genesis".to_string(),
            other: HashMap::new(),
        };
        let block = BlockTemplate::next(&tip, vec![], Difficulty::new(1).unwrap())
            .seal(1, "0f".to_string());
        let json = serde_json::to_value(PeerMessage::NewBlock(block)).unwrap();

        assert_eq!(json["type"], "NEW_BLOCK");
        assert_eq!(json["data"]["previousHash"], "genesis");
    }

    #[test]
    fn test_mining_stats_from_attempts() {
        let stats = MiningStats::from_attempts(1000, 10.0);
        assert_eq!(stats.hash_rate, 100.0);

        let stats = MiningStats::from_attempts(1000, 0.0);
        assert_eq!(stats.hash_rate, 0.0);
    }

    #[test]
    fn test_format_hash_rate() {
        assert_eq!(format_hash_rate(100.0), "100.00 H/s");
        assert_eq!(format_hash_rate(1500.0), "1.50 KH/s");
        assert_eq!(format_hash_rate(1_000_000.0), "1.00 MH/s");
    }
}
