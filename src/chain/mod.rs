//! Blockchain Facades
//!
//! The transaction engine never touches storage directly; it reads chain
//! state through the narrow, synchronous traits defined here. A node wires
//! these to its block database; tests and embedders can use the in-memory
//! implementations.
//!
//! All facades are expected to manage their own synchronization. The engine
//! holds no locks across facade calls.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::crypto::EncryptedData;
use crate::error::Result;
use crate::transaction::Transaction;

/// Number of blocks below the tip within which an economic-cluster block
/// may be chosen.
pub const EC_BLOCK_DISTANCE: i32 = 720;

/// A recent block a transaction commits to. Transactions generated on a
/// fork carry an `(height, id)` pair the canonical chain disagrees with and
/// are rejected until the fork resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcBlock {
    pub height: i32,
    pub id: u64,
}

/// Read-only view of the blockchain consumed by the builder and validator.
pub trait ChainView: Send + Sync {
    /// Current chain height.
    fn height(&self) -> i32;

    /// Resolves the economic-cluster block for a transaction created at
    /// `timestamp` (protocol-epoch seconds).
    fn ec_block(&self, timestamp: i32) -> EcBlock;

    /// Id of the block at `height` on the canonical chain, if within it.
    fn block_id_at_height(&self, height: i32) -> Option<u64>;
}

/// Lookup of phasing polls by transaction id. A poll exists for every
/// phased transaction that has been accepted into a block and not yet
/// resolved.
pub trait PhasingPolls: Send + Sync {
    fn poll_exists(&self, transaction_id: u64) -> bool;
}

/// Account-level restrictions (asset-controlled accounts and similar).
/// Consulted last in normal validation; failures are recoverable.
pub trait AccountPolicy: Send + Sync {
    fn check_transaction(&self, transaction: &Transaction) -> Result<()>;
}

/// Archival source for prunable appendage payloads, keyed by the owning
/// transaction's full hash.
pub trait PrunableStore: Send + Sync {
    /// Plain-message payload and its is-text flag.
    fn plain_message(&self, full_hash: &[u8; 32]) -> Option<(Vec<u8>, bool)>;

    /// Encrypted-message payload and its is-text flag.
    fn encrypted_message(&self, full_hash: &[u8; 32]) -> Option<(EncryptedData, bool)>;
}

/// Phasing-poll lookup that knows no polls. Suitable for nodes that have
/// not yet observed any phased transactions, and for tests.
#[derive(Debug, Default)]
pub struct NoPolls;

impl PhasingPolls for NoPolls {
    fn poll_exists(&self, _transaction_id: u64) -> bool {
        false
    }
}

/// Policy that restricts nothing.
#[derive(Debug, Default)]
pub struct OpenPolicy;

impl AccountPolicy for OpenPolicy {
    fn check_transaction(&self, _transaction: &Transaction) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredBlock {
    id: u64,
    timestamp: i32,
}

/// In-memory [`ChainView`] backed by a height-ordered block index.
#[derive(Debug, Default)]
pub struct MemoryChain {
    blocks: RwLock<BTreeMap<i32, StoredBlock>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block at the next height.
    pub fn push_block(&self, id: u64, timestamp: i32) {
        let mut blocks = self.blocks.write().expect("chain lock poisoned");
        let height = blocks.keys().next_back().map(|h| h + 1).unwrap_or(0);
        blocks.insert(height, StoredBlock { id, timestamp });
    }

    /// Places a block at an explicit height, overwriting any previous
    /// occupant. Used to simulate forks in tests.
    pub fn set_block_at_height(&self, height: i32, id: u64, timestamp: i32) {
        self.blocks
            .write()
            .expect("chain lock poisoned")
            .insert(height, StoredBlock { id, timestamp });
    }
}

impl ChainView for MemoryChain {
    fn height(&self) -> i32 {
        self.blocks
            .read()
            .expect("chain lock poisoned")
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    fn ec_block(&self, timestamp: i32) -> EcBlock {
        let blocks = self.blocks.read().expect("chain lock poisoned");
        let tip = blocks.keys().next_back().copied().unwrap_or(0);
        let floor = (tip - EC_BLOCK_DISTANCE).max(0);
        blocks
            .range(floor..)
            .rev()
            .find(|(_, block)| block.timestamp <= timestamp)
            .map(|(height, block)| EcBlock {
                height: *height,
                id: block.id,
            })
            .unwrap_or(EcBlock { height: 0, id: 0 })
    }

    fn block_id_at_height(&self, height: i32) -> Option<u64> {
        self.blocks
            .read()
            .expect("chain lock poisoned")
            .get(&height)
            .map(|block| block.id)
    }
}

/// In-memory [`PrunableStore`] for tests and small archival nodes.
#[derive(Debug, Default)]
pub struct MemoryPrunableStore {
    plain: RwLock<std::collections::HashMap<[u8; 32], (Vec<u8>, bool)>>,
    encrypted: RwLock<std::collections::HashMap<[u8; 32], (EncryptedData, bool)>>,
}

impl MemoryPrunableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_plain_message(&self, full_hash: [u8; 32], payload: Vec<u8>, is_text: bool) {
        self.plain
            .write()
            .expect("store lock poisoned")
            .insert(full_hash, (payload, is_text));
    }

    pub fn store_encrypted_message(
        &self,
        full_hash: [u8; 32],
        payload: EncryptedData,
        is_text: bool,
    ) {
        self.encrypted
            .write()
            .expect("store lock poisoned")
            .insert(full_hash, (payload, is_text));
    }
}

impl PrunableStore for MemoryPrunableStore {
    fn plain_message(&self, full_hash: &[u8; 32]) -> Option<(Vec<u8>, bool)> {
        self.plain
            .read()
            .expect("store lock poisoned")
            .get(full_hash)
            .cloned()
    }

    fn encrypted_message(&self, full_hash: &[u8; 32]) -> Option<(EncryptedData, bool)> {
        self.encrypted
            .read()
            .expect("store lock poisoned")
            .get(full_hash)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_tracks_pushed_blocks() {
        let chain = MemoryChain::new();
        assert_eq!(chain.height(), 0);

        chain.push_block(11, 100);
        chain.push_block(22, 200);
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.block_id_at_height(0), Some(11));
        assert_eq!(chain.block_id_at_height(1), Some(22));
        assert_eq!(chain.block_id_at_height(5), None);
    }

    #[test]
    fn test_ec_block_respects_timestamp() {
        let chain = MemoryChain::new();
        chain.push_block(11, 100);
        chain.push_block(22, 200);
        chain.push_block(33, 300);

        let ec = chain.ec_block(250);
        assert_eq!(ec, EcBlock { height: 1, id: 22 });

        // Nothing early enough: fall back to the genesis sentinel.
        assert_eq!(chain.ec_block(50), EcBlock { height: 0, id: 0 });
    }

    #[test]
    fn test_fork_simulation() {
        let chain = MemoryChain::new();
        chain.push_block(11, 100);
        chain.push_block(22, 200);
        chain.set_block_at_height(1, 99, 200);
        assert_eq!(chain.block_id_at_height(1), Some(99));
    }
}
