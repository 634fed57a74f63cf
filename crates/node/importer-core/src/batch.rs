//! [`BatchImporter`] (C3, §4.3): walks a batch of blocks through the ledger sequentially.

use tracing::{trace, warn};

use crate::{
    ledger::Ledger,
    model::{Block, BlockWithTd, Fault, ImportOutcome, LedgerFault},
};

/// The result of importing a batch (§9's "prefer a tagged variant" design note, over a tuple of
/// `(imported, Option<fault>)`).
#[derive(Debug)]
pub enum BatchResult<B: Block> {
    /// Every block in the batch was consumed without fault.
    Complete {
        /// Blocks (and their total difficulties) adopted over the whole batch, in adoption
        /// order (newest-first at any reorg boundary, per §4.3's tie-break rule).
        imported: Vec<BlockWithTd<B>>,
        /// Blocks displaced by any reorgs that occurred during the batch, concatenated across
        /// reorg boundaries; the actor pool-syncs against these at the batch boundary (§8 sc. 2).
        displaced: Vec<B>,
    },
    /// The batch stopped partway through on a recoverable fault.
    Partial {
        /// Blocks (and their total difficulties) adopted before the fault.
        imported: Vec<BlockWithTd<B>>,
        /// Blocks displaced by any reorgs before the fault.
        displaced: Vec<B>,
        /// The fault that stopped the batch.
        fault: Fault,
        /// The blocks of the input batch that were not yet attempted.
        remaining: Vec<B>,
    },
    /// The batch stopped on a catastrophic ledger failure; fatal to the actor (§7).
    Fatal {
        /// Blocks adopted before the failure.
        imported: Vec<BlockWithTd<B>>,
        /// The stringified catastrophic error.
        reason: String,
    },
}

/// Walks a list of blocks through the ledger strictly in order, accumulating outcomes and
/// stopping on the first fault (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct BatchImporter {
    /// Whether a `MissingStateNode` fault should be treated as recoverable (`true`) or fatal.
    pub redownload_missing_state_nodes: bool,
}

impl BatchImporter {
    /// Construct a batch importer with the given missing-state-node repair policy.
    #[must_use]
    pub const fn new(redownload_missing_state_nodes: bool) -> Self {
        Self { redownload_missing_state_nodes }
    }

    /// Import `blocks` strictly in order, per the dispatch table in §4.3.
    pub async fn import_batch<B, L>(&self, blocks: Vec<B>, ledger: &L) -> BatchResult<B>
    where
        B: Block,
        L: Ledger<B>,
    {
        let mut imported: Vec<BlockWithTd<B>> = Vec::new();
        let mut displaced: Vec<B> = Vec::new();
        let mut iter = blocks.into_iter();

        while let Some(block) = iter.next() {
            let number = block.number();
            let retry_candidate = block.clone();
            match ledger.import_block(block).await {
                Ok(ImportOutcome::ImportedToTop(chain)) => {
                    trace!(target: "importer", block = number, "imported to top");
                    imported.extend(chain);
                }
                Ok(ImportOutcome::Reorganised { old_branch, new_branch, new_total_difficulties }) => {
                    trace!(target: "importer", block = number, "reorganised mid-batch");
                    displaced.extend(old_branch);
                    let mut reversed: Vec<BlockWithTd<B>> = new_branch
                        .into_iter()
                        .zip(new_total_difficulties)
                        .map(|(block, total_difficulty)| BlockWithTd { block, total_difficulty })
                        .collect();
                    reversed.reverse();
                    let previously_imported = std::mem::take(&mut imported);
                    imported = reversed;
                    imported.extend(previously_imported);
                }
                Ok(ImportOutcome::Duplicate | ImportOutcome::Enqueued) => {
                    trace!(target: "importer", block = number, "no-op outcome");
                }
                Ok(ImportOutcome::UnknownParent) => {
                    warn!(target: "importer", block = number, "unknown parent mid-batch");
                    let remaining: Vec<B> = iter.collect();
                    return BatchResult::Partial {
                        imported,
                        displaced,
                        fault: Fault::Rejected { number, reason: "unknown parent".to_string() },
                        remaining,
                    };
                }
                Ok(ImportOutcome::Failed(reason)) => {
                    warn!(target: "importer", block = number, %reason, "block failed mid-batch");
                    let remaining: Vec<B> = iter.collect();
                    return BatchResult::Partial {
                        imported,
                        displaced,
                        fault: Fault::Rejected { number, reason },
                        remaining,
                    };
                }
                Err(LedgerFault::MissingStateNode(hash)) => {
                    if self.redownload_missing_state_nodes {
                        warn!(target: "importer", block = number, "missing state node, entering repair");
                        let mut remaining = vec![retry_candidate];
                        remaining.extend(iter);
                        return BatchResult::Partial {
                            imported,
                            displaced,
                            fault: Fault::MissingStateNode(hash),
                            remaining,
                        };
                    }
                    return BatchResult::Fatal {
                        imported,
                        reason: format!("missing state node at block {number} (repair disabled)"),
                    };
                }
                Err(LedgerFault::Catastrophic(reason)) => {
                    return BatchResult::Fatal { imported, reason };
                }
            }
        }

        BatchResult::Complete { imported, displaced }
    }
}
