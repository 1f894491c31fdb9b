//! Account balance ledger
//!
//! In-memory address-to-balance map with an explicit load/save snapshot cycle
//! and an outbox mirroring every applied transfer to an external ledger
//! service. The reward address is a sentinel sender for protocol issuance and
//! is never balance-checked. Saving is explicit; the in-memory map may run
//! ahead of the on-disk snapshot between flushes.

use crate::types::{Address, MinedBlock, Transaction};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// External mirror for applied transfers
#[async_trait]
pub trait LedgerMirror: Send + Sync {
    /// Record a transfer in the external ledger service
    async fn mirror_transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<()>;
}

/// A transfer waiting to be acknowledged by the mirror service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

/// On-disk account record: `{"balance": <n>}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountEntry {
    balance: u64,
}

/// On-disk snapshot: `{"accounts": {<address>: {"balance": <n>}}}`
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    accounts: HashMap<Address, AccountEntry>,
}

/// Address-to-balance ledger with a mirror outbox
pub struct BalanceLedger {
    balances: HashMap<Address, u64>,
    reward_address: Address,
    snapshot_path: PathBuf,
    outbox: VecDeque<MirrorEntry>,
}

impl BalanceLedger {
    /// Create an empty ledger backed by the given snapshot file
    pub fn new(snapshot_path: impl Into<PathBuf>, reward_address: Address) -> Self {
        Self {
            balances: HashMap::new(),
            reward_address,
            snapshot_path: snapshot_path.into(),
            outbox: VecDeque::new(),
        }
    }

    /// Load balances from the snapshot file.
    ///
    /// A missing file is not an error: the ledger starts empty and writes an
    /// initial snapshot so later saves have a directory to land in.
    pub fn load(&mut self) -> Result<()> {
        if !self.snapshot_path.exists() {
            info!(
                path = %self.snapshot_path.display(),
                "No ledger snapshot found, creating a new one"
            );
            return self.save();
        }

        let data = fs::read_to_string(&self.snapshot_path)?;
        let snapshot: Snapshot = serde_json::from_str(&data)?;
        self.balances = snapshot
            .accounts
            .into_iter()
            .map(|(address, entry)| (address, entry.balance))
            .collect();

        info!(accounts = self.balances.len(), "Ledger snapshot loaded");
        Ok(())
    }

    /// Write the full balance map to the snapshot file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let snapshot = Snapshot {
            accounts: self
                .balances
                .iter()
                .map(|(address, balance)| (address.clone(), AccountEntry { balance: *balance }))
                .collect(),
        };

        fs::write(&self.snapshot_path, serde_json::to_string_pretty(&snapshot)?)?;
        debug!(path = %self.snapshot_path.display(), "Ledger snapshot saved");
        Ok(())
    }

    /// Apply a transfer to the ledger.
    ///
    /// Returns `false` and mutates nothing when the sender lacks funds (or
    /// the credit would overflow). Transfers from the reward address mint
    /// unconditionally. A successful application queues a mirror entry in the
    /// same mutation.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> bool {
        let is_reward = tx.from == self.reward_address;

        if !is_reward {
            match self.balances.get(&tx.from) {
                Some(balance) if *balance >= tx.amount => {}
                Some(balance) => {
                    warn!(
                        from = %tx.from,
                        balance = *balance,
                        needed = tx.amount,
                        "Transfer refused: insufficient funds"
                    );
                    return false;
                }
                None => {
                    warn!(from = %tx.from, "Transfer refused: unknown sender account");
                    return false;
                }
            }
        }

        let recipient = self.balances.entry(tx.to.clone()).or_insert(0);
        let Some(credited) = recipient.checked_add(tx.amount) else {
            warn!(to = %tx.to, "Transfer refused: recipient balance would overflow");
            return false;
        };
        *recipient = credited;

        if !is_reward {
            // Sufficiency was checked above; the entry exists
            if let Some(balance) = self.balances.get_mut(&tx.from) {
                *balance -= tx.amount;
            }
        }

        self.outbox.push_back(MirrorEntry {
            from: tx.from.clone(),
            to: tx.to.clone(),
            amount: tx.amount,
        });

        debug!(from = %tx.from, to = %tx.to, amount = tx.amount, "Transfer applied");
        true
    }

    /// Apply every transaction in an accepted block, in order.
    ///
    /// Returns how many were applied; refused transfers are skipped, not
    /// fatal.
    pub fn apply_block(&mut self, block: &MinedBlock) -> usize {
        block
            .transactions
            .iter()
            .filter(|tx| self.apply_transaction(tx))
            .count()
    }

    /// Look up an account balance; `None` means the account does not exist
    pub fn balance(&self, address: &Address) -> Option<u64> {
        self.balances.get(address).copied()
    }

    /// Number of tracked accounts
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }

    /// Number of transfers waiting for mirror acknowledgement
    pub fn pending_mirrors(&self) -> usize {
        self.outbox.len()
    }

    /// Drain the mirror outbox through the given mirror.
    ///
    /// Entries are removed only once acknowledged; the first failure stops
    /// the drain and leaves the remaining entries queued for the next flush.
    /// Mirror failure never touches local balances.
    pub async fn flush_outbox(&mut self, mirror: &dyn LedgerMirror) -> usize {
        let mut flushed = 0;

        while let Some(entry) = self.outbox.front() {
            match mirror
                .mirror_transfer(&entry.from, &entry.to, entry.amount)
                .await
            {
                Ok(()) => {
                    self.outbox.pop_front();
                    flushed += 1;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        pending = self.outbox.len(),
                        "Mirror transfer failed, keeping outbox entries"
                    );
                    break;
                }
            }
        }

        flushed
    }
}
