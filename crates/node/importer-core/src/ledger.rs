//! The ledger collaborator contract (§6).

use async_trait::async_trait;

use crate::model::{Block, BranchClassification, ImportOutcome, LedgerFault};

/// The EVM/trie-backed ledger the importer drives blocks through.
///
/// Out of scope for this crate (§1): the importer only ever calls through this trait. A
/// production implementation executes transactions and mutates the trie store; a test double
/// may be a plain in-memory map.
#[async_trait]
pub trait Ledger<B: Block>: Send + Sync {
    /// Attempt to import one block, returning either a domain outcome or a [`LedgerFault`].
    async fn import_block(&self, block: B) -> Result<ImportOutcome<B>, LedgerFault>;

    /// Classify a candidate branch from its headers (oldest-first) against the current chain.
    async fn resolve_branch(&self, headers: &[B::Header]) -> BranchClassification<B>;

    /// The number of the current chain tip.
    async fn best_block_number(&self) -> u64;

    /// Persist a trie node fetched during missing-state-node repair.
    async fn save_node(&self, hash: [u8; 32], bytes: Vec<u8>, block_number: u64);
}
