//! [`SingleBlockImporter`] (C4, §4.4): handles one mined or peer-broadcast block.

use tracing::{debug, trace, warn};

use crate::{
    ledger::Ledger,
    model::{Block, BlockWithTd, ImportOutcome, LedgerFault},
};

/// What the caller should do in response to a single-block import (§4.4).
#[derive(Debug)]
pub enum SingleBlockEffect<B: Block> {
    /// Broadcast `chain` to peers and pool-synchronise against it (no displaced branch).
    Broadcast(Vec<BlockWithTd<B>>),
    /// Offer this header to the ommer pool; no other action.
    OfferOmmer(B::Header),
    /// A reorg occurred: pool-synchronise against `old`/`new`, then broadcast `new`.
    Reorganised {
        /// The displaced branch.
        old: Vec<B>,
        /// The newly-canonical branch, paired with its total difficulties.
        new: Vec<BlockWithTd<B>>,
    },
    /// The peer-broadcast path should report this failure back to the fetcher.
    ReportFailure {
        /// The number of the block that failed.
        number: u64,
        /// The stringified validation error.
        reason: String,
    },
    /// A missing trie node was observed and logged; header-sync will trigger the re-fetch.
    MissingStateNodeObserved,
    /// No action required (duplicate, out-of-order unknown-parent, or a failure that should
    /// not be reported to the fetcher).
    None,
}

/// Handles one mined or peer-broadcast block (§4.4).
///
/// Both entry points share this one implementation, parameterised by whether the fetcher should
/// be told about a validation failure: the fetcher never produced a mined block, so penalising a
/// peer over it would be wrong; a peer-broadcast block's failure is reported so the fetcher can
/// act on it.
#[derive(Debug, Clone, Copy)]
pub struct SingleBlockImporter {
    inform_fetcher_on_fail: bool,
}

impl SingleBlockImporter {
    /// A locally-mined block: failures are never reported to the fetcher.
    #[must_use]
    pub const fn mined() -> Self {
        Self { inform_fetcher_on_fail: false }
    }

    /// A block received via peer broadcast: failures are reported to the fetcher.
    #[must_use]
    pub const fn peer_broadcast() -> Self {
        Self { inform_fetcher_on_fail: true }
    }

    /// Import `block` and map the outcome to the effect the caller should carry out (§4.4).
    ///
    /// A `MissingStateNode` fault is always just observed and logged here, regardless of the
    /// batch-level repair configuration (§9's open-question decision: the asymmetry is
    /// preserved and made observable via a metrics counter rather than unified away).
    pub async fn import<B, L>(&self, block: B, ledger: &L) -> Result<SingleBlockEffect<B>, LedgerFault>
    where
        B: Block,
        L: Ledger<B>,
    {
        let number = block.number();
        let header = block.header();
        match ledger.import_block(block).await {
            Ok(ImportOutcome::ImportedToTop(chain)) => {
                trace!(target: "importer", block = number, "single block imported to top");
                Ok(SingleBlockEffect::Broadcast(chain))
            }
            Ok(outcome) => {
                Ok(Self::map_non_top_outcome(number, header, outcome, self.inform_fetcher_on_fail))
            }
            Err(LedgerFault::MissingStateNode(_hash)) => {
                warn!(target: "importer", block = number, "missing state node on single-block import");
                crate::metrics::single_block_missing_node_observed();
                Ok(SingleBlockEffect::MissingStateNodeObserved)
            }
            Err(fault @ LedgerFault::Catastrophic(_)) => Err(fault),
        }
    }

    fn map_non_top_outcome<B: Block>(
        number: u64,
        header: B::Header,
        outcome: ImportOutcome<B>,
        inform_fetcher_on_fail: bool,
    ) -> SingleBlockEffect<B> {
        match outcome {
            ImportOutcome::ImportedToTop(_) => unreachable!("handled by caller"),
            ImportOutcome::Enqueued => {
                trace!(target: "importer", block = number, "single block enqueued, offering as ommer");
                SingleBlockEffect::OfferOmmer(header)
            }
            ImportOutcome::Duplicate | ImportOutcome::UnknownParent => {
                trace!(target: "importer", block = number, "no-op single-block outcome");
                SingleBlockEffect::None
            }
            ImportOutcome::Reorganised { old_branch, new_branch, new_total_difficulties } => {
                debug!(target: "importer", block = number, "single block caused reorg");
                let new = new_branch
                    .into_iter()
                    .zip(new_total_difficulties)
                    .map(|(block, total_difficulty)| BlockWithTd { block, total_difficulty })
                    .collect();
                SingleBlockEffect::Reorganised { old: old_branch, new }
            }
            ImportOutcome::Failed(reason) => {
                warn!(target: "importer", block = number, %reason, "single block failed");
                if inform_fetcher_on_fail {
                    SingleBlockEffect::ReportFailure { number, reason }
                } else {
                    SingleBlockEffect::None
                }
            }
        }
    }
}
