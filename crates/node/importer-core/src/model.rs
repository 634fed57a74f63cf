//! Domain types the import control loop operates over.
//!
//! Blocks, headers and transactions are opaque to this crate (see the spec's data model):
//! callers supply their own concrete types and wire them up through the [`Block`] trait.

use std::{fmt::Debug, hash::Hash};

/// A candidate block as seen by the importer.
///
/// The importer never inspects a block's payload beyond what this trait exposes: its number,
/// its header, its transactions and its declared uncles (ommers).
pub trait Block: Clone + Debug + Send + Sync + 'static {
    /// The block's header type.
    type Header: BlockHeader;
    /// The block's transaction type. Transaction sets are compared by identity/hash.
    type Transaction: Clone + Debug + Eq + Hash + Send + Sync + 'static;

    /// The block number.
    fn number(&self) -> u64;
    /// The block's header.
    fn header(&self) -> Self::Header;
    /// The block's transactions.
    fn transactions(&self) -> Vec<Self::Transaction>;
    /// The block's declared uncles (ommer headers).
    fn uncles(&self) -> Vec<Self::Header>;
}

/// A block header: the minimal identity needed for branch bookkeeping and ommer candidacy.
pub trait BlockHeader: Clone + Debug + Eq + Hash + Send + Sync + 'static {
    /// The block number this header describes.
    fn number(&self) -> u64;
    /// A stable identity hash for this header.
    fn block_hash(&self) -> [u8; 32];
}

/// A block paired with the chain's cumulative proof-of-work weight after it (total difficulty).
#[derive(Debug, Clone)]
pub struct BlockWithTd<B: Block> {
    /// The block.
    pub block: B,
    /// The chain's total difficulty once this block is canonical.
    pub total_difficulty: u128,
}

/// The outcome of importing a single block through the ledger (§3).
#[derive(Debug, Clone)]
pub enum ImportOutcome<B: Block> {
    /// The block extended the canonical chain; `chain` is the run of newly-canonical blocks
    /// (itself included) together with their total difficulties.
    ImportedToTop(Vec<BlockWithTd<B>>),
    /// The block is valid but its parent is not yet known/canonical; it was buffered.
    Enqueued,
    /// The block is already known and canonical.
    Duplicate,
    /// The block's parent could not be found.
    UnknownParent,
    /// The import caused a chain reorganisation.
    Reorganised {
        /// The suffix of the previously-canonical chain that was displaced.
        old_branch: Vec<B>,
        /// The newly-canonical blocks that replaced `old_branch`.
        new_branch: Vec<B>,
        /// Total difficulty after each block of `new_branch`, paired positionally.
        new_total_difficulties: Vec<u128>,
    },
    /// The block failed validation or execution; `reason` is a human-readable explanation.
    Failed(String),
}

/// An out-of-band fault observed from a ledger call, distinct from [`ImportOutcome`] because it
/// replaces the whole `Result` rather than being one of its variants (§3, §7).
#[derive(Debug, Clone)]
pub enum LedgerFault {
    /// A trie node required to execute a block could not be found locally.
    MissingStateNode([u8; 32]),
    /// Any other exception bubbling out of the ledger; fatal to the importer actor (§7).
    Catastrophic(String),
}

/// The result of asking the ledger to classify a candidate branch (§4.2).
#[derive(Debug, Clone)]
pub enum BranchClassification<B: Block> {
    /// The candidate branch is heavier than the current canonical chain; `old_branch` is the
    /// displaced suffix.
    NewBetterBranch {
        /// The displaced suffix of the previously-canonical chain.
        old_branch: Vec<B>,
    },
    /// The candidate branch does not improve on the canonical chain.
    NoChainSwitch,
    /// The candidate branch's ancestry could not be established.
    UnknownBranch,
    /// The candidate branch is invalid.
    InvalidBranch,
}

/// A recoverable fault surfaced by [`crate::batch::BatchImporter::import_batch`] (§4.3).
#[derive(Debug, Clone)]
pub enum Fault {
    /// A trie node is missing; recoverable because state-node repair is enabled.
    MissingStateNode([u8; 32]),
    /// A block was rejected by the ledger (failed validation or unknown parent); `number` is the
    /// first non-imported block, the point the fetcher should invalidate from (§4.3).
    Rejected {
        /// The number of the first non-imported block.
        number: u64,
        /// A human-readable reason, forwarded to the fetcher.
        reason: String,
    },
}
