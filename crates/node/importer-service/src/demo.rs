//! A concrete in-memory block/ledger pair used by the demonstration binary and integration
//! tests: a tiny linear chain with no forks, enough to exercise the import control loop without
//! pulling in a real EVM/trie implementation (out of scope per §1).

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chain_importer_core::{Block, BlockHeader, BlockWithTd, BranchClassification, ImportOutcome, Ledger, LedgerFault};

/// A header for [`DemoBlock`]: just a number and a stand-in hash derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DemoHeader {
    number: u64,
}

impl BlockHeader for DemoHeader {
    fn number(&self) -> u64 {
        self.number
    }

    fn block_hash(&self) -> [u8; 32] {
        let mut hash = [0u8; 32];
        hash[0..8].copy_from_slice(&self.number.to_be_bytes());
        hash
    }
}

/// A minimal block: a number and a handful of opaque transaction ids.
#[derive(Debug, Clone)]
pub struct DemoBlock {
    /// The block's number.
    pub number: u64,
    /// Opaque transaction identifiers carried by this block.
    pub transactions: Vec<u64>,
}

impl DemoBlock {
    /// Construct a demo block with the given number and transaction ids.
    #[must_use]
    pub const fn new(number: u64, transactions: Vec<u64>) -> Self {
        Self { number, transactions }
    }
}

impl Block for DemoBlock {
    type Header = DemoHeader;
    type Transaction = u64;

    fn number(&self) -> u64 {
        self.number
    }

    fn header(&self) -> Self::Header {
        DemoHeader { number: self.number }
    }

    fn transactions(&self) -> Vec<Self::Transaction> {
        self.transactions.clone()
    }

    fn uncles(&self) -> Vec<Self::Header> {
        Vec::new()
    }
}

/// An in-memory ledger accepting any block that extends the current chain tip by exactly one,
/// rejecting (as `Failed`) anything else. No reorgs, no missing-node simulation: a linear-chain
/// demonstration double, not a model of consensus.
#[derive(Debug, Default)]
pub struct DemoLedger {
    tip: AtomicU64,
    nodes: Mutex<HashMap<[u8; 32], (Vec<u8>, u64)>>,
}

impl DemoLedger {
    /// Construct a demo ledger starting at genesis (tip 0).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger<DemoBlock> for DemoLedger {
    async fn import_block(&self, block: DemoBlock) -> Result<ImportOutcome<DemoBlock>, LedgerFault> {
        let tip = self.tip.load(Ordering::SeqCst);
        if block.number <= tip {
            return Ok(ImportOutcome::Duplicate);
        }
        if block.number > tip + 1 {
            return Ok(ImportOutcome::UnknownParent);
        }
        self.tip.store(block.number, Ordering::SeqCst);
        Ok(ImportOutcome::ImportedToTop(vec![BlockWithTd {
            total_difficulty: u128::from(block.number),
            block,
        }]))
    }

    async fn resolve_branch(&self, headers: &[DemoHeader]) -> BranchClassification<DemoBlock> {
        let tip = self.tip.load(Ordering::SeqCst);
        match headers.first() {
            Some(first) if first.number == tip + 1 => BranchClassification::NewBetterBranch { old_branch: Vec::new() },
            Some(first) if first.number <= tip => BranchClassification::NoChainSwitch,
            _ => BranchClassification::UnknownBranch,
        }
    }

    async fn best_block_number(&self) -> u64 {
        self.tip.load(Ordering::SeqCst)
    }

    async fn save_node(&self, hash: [u8; 32], bytes: Vec<u8>, block_number: u64) {
        self.nodes.lock().unwrap().insert(hash, (bytes, block_number));
    }
}
