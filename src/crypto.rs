//! Block hashing for cupchain mining
//!
//! Blake2s-256 over the block contents. The preimage covers index, timestamp,
//! transactions, previous hash, and nonce; everything except the nonce is
//! fixed per round, so the hasher precomputes that prefix once and the search
//! loop only appends nonces.

use crate::types::{BlockTemplate, MinedBlock};
use crate::Result;
use blake2::{Blake2s256, Digest};

/// Hasher for one block template, reused across the whole nonce search
#[derive(Debug, Clone)]
pub struct BlockHasher {
    prefix: Vec<u8>,
}

impl BlockHasher {
    /// Precompute the nonce-independent preimage prefix for a template
    pub fn for_template(template: &BlockTemplate) -> Result<Self> {
        Ok(Self {
            prefix: preimage_prefix(
                template.index,
                &template.timestamp,
                serde_json::to_string(&template.transactions)?,
                &template.previous_hash,
            ),
        })
    }

    /// Hash the template contents with the given nonce
    pub fn hash(&self, nonce: u64) -> String {
        let mut hasher = Blake2s256::new();
        hasher.update(&self.prefix);
        hasher.update(nonce.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn preimage_prefix(index: u64, timestamp: &str, tx_json: String, previous_hash: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(tx_json.len() + timestamp.len() + previous_hash.len() + 20);
    prefix.extend_from_slice(index.to_string().as_bytes());
    prefix.extend_from_slice(timestamp.as_bytes());
    prefix.extend_from_slice(tx_json.as_bytes());
    prefix.extend_from_slice(previous_hash.as_bytes());
    prefix
}

/// Recompute a mined block's hash from its contents
pub fn recompute_hash(block: &MinedBlock) -> Result<String> {
    let prefix = preimage_prefix(
        block.index,
        &block.timestamp,
        serde_json::to_string(&block.transactions)?,
        &block.previous_hash,
    );
    let mut hasher = Blake2s256::new();
    hasher.update(&prefix);
    hasher.update(block.nonce.to_string().as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Check that a mined block's stored hash matches its contents and satisfies
/// its difficulty.
pub fn verify_block(block: &MinedBlock) -> Result<bool> {
    Ok(recompute_hash(block)? == block.hash && block.difficulty.is_satisfied_by(&block.hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainTip, Difficulty, Transaction};
    use std::collections::HashMap;

    fn test_template() -> BlockTemplate {
        let tip = ChainTip {
            index: 9,
            hash: "00deadbeef".to_string(),
            other: HashMap::new(),
        };
        BlockTemplate::next(
            &tip,
            vec![Transaction::new("alice", "bob", 5)],
            Difficulty::new(1).unwrap(),
        )
    }

    #[test]
    fn test_hashing_is_deterministic() {
        let template = test_template();
        let hasher = BlockHasher::for_template(&template).unwrap();

        assert_eq!(hasher.hash(42), hasher.hash(42));
        assert_ne!(hasher.hash(42), hasher.hash(43));
    }

    #[test]
    fn test_hash_depends_on_contents() {
        let template = test_template();
        let mut other = template.clone();
        other.previous_hash = "ffff".to_string();

        let a = BlockHasher::for_template(&template).unwrap();
        let b = BlockHasher::for_template(&other).unwrap();
        assert_ne!(a.hash(0), b.hash(0));
    }

    #[test]
    fn test_sealed_block_verifies() {
        let template = test_template();
        let hasher = BlockHasher::for_template(&template).unwrap();
        let block = template.seal(1234, hasher.hash(1234));

        assert_eq!(recompute_hash(&block).unwrap(), block.hash);
    }

    #[test]
    fn test_tampered_block_fails_verification() {
        let template = test_template();
        let hasher = BlockHasher::for_template(&template).unwrap();
        let mut block = template.seal(1234, hasher.hash(1234));
        block.nonce = 1235;

        assert!(!verify_block(&block).unwrap());
    }

    #[test]
    fn test_verify_checks_difficulty() {
        let template = test_template();
        let hasher = BlockHasher::for_template(&template).unwrap();

        // Find a nonce whose hash misses difficulty 1, then seal with it --
        // the content hash matches but the difficulty predicate fails.
        let nonce = (0..10_000u64)
            .find(|n| !hasher.hash(*n).starts_with('0'))
            .unwrap();
        let block = template.seal(nonce, hasher.hash(nonce));
        assert!(!verify_block(&block).unwrap());
    }
}
