//! [`BranchResolver`] (C2, §4.2): thin wrapper over the ledger's branch classification.

use tracing::{debug, warn};

use crate::{
    ledger::Ledger,
    model::{Block, BranchClassification},
};

/// Instructions for the fetcher produced alongside a resolution (§4.2, §6).
#[derive(Debug, Clone)]
pub struct Invalidate {
    /// The block number to invalidate (and re-fetch) from.
    pub from_number: u64,
    /// A human-readable reason, forwarded to the fetcher for logging/diagnostics.
    pub reason: String,
    /// Whether the offending peer should be blacklisted.
    pub with_blacklist: bool,
}

/// The outcome of resolving a candidate branch: blocks to import, plus any side-effects already
/// dispatched to the ommer/tx pools and any fetcher invalidation to issue.
#[derive(Debug)]
pub struct BranchResolution<B: Block> {
    /// Blocks to hand to the batch importer; empty unless the branch replaces the canonical
    /// chain.
    pub blocks: Vec<B>,
    /// A displaced branch whose transactions/ommer candidacy must be restored, if any.
    pub displaced: Vec<B>,
    /// An ommer header offered as a side-effect of this resolution, if any.
    pub ommer_candidate: Option<B::Header>,
    /// A fetcher invalidation instruction, if the branch was rejected.
    pub invalidate: Option<Invalidate>,
}

/// Classifies a candidate branch and derives the side-effects/invalidation instructions that
/// follow from the classification (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct BranchResolver {
    /// Lookback used to re-fetch history when the branch's ancestry is unknown.
    pub branch_resolution_request_size: u64,
}

impl BranchResolver {
    /// Construct a resolver with the given lookback window.
    #[must_use]
    pub const fn new(branch_resolution_request_size: u64) -> Self {
        Self { branch_resolution_request_size }
    }

    /// Resolve `blocks` (oldest-first) against the ledger's current chain (§4.2).
    ///
    /// Side-effects on the ommer/tx pools are returned, not performed, so the caller can
    /// dispatch them before handing the returned blocks to the batch importer — preserving the
    /// ordering requirement that reorg-bound transactions cannot be lost if import then fails.
    pub async fn resolve<B, L>(&self, blocks: Vec<B>, ledger: &L) -> BranchResolution<B>
    where
        B: Block,
        L: Ledger<B>,
    {
        let Some(first) = blocks.first() else {
            return BranchResolution {
                blocks: Vec::new(),
                displaced: Vec::new(),
                ommer_candidate: None,
                invalidate: None,
            };
        };
        let first_number = first.number();
        let headers: Vec<B::Header> = blocks.iter().map(Block::header).collect();

        match ledger.resolve_branch(&headers).await {
            BranchClassification::NewBetterBranch { old_branch } => {
                debug!(target: "importer", from = first_number, "branch accepted, displacing old branch");
                let ommer_candidate = old_branch.first().map(Block::header);
                BranchResolution {
                    blocks,
                    displaced: old_branch,
                    ommer_candidate,
                    invalidate: None,
                }
            }
            BranchClassification::NoChainSwitch => {
                warn!(target: "importer", from = first_number, "no chain switch, no progress");
                BranchResolution {
                    blocks: Vec::new(),
                    displaced: Vec::new(),
                    ommer_candidate: Some(first.header()),
                    invalidate: Some(Invalidate {
                        from_number: first_number,
                        reason: "no progress on chain".to_string(),
                        with_blacklist: false,
                    }),
                }
            }
            BranchClassification::UnknownBranch => {
                warn!(target: "importer", from = first_number, "unknown branch ancestry");
                let from_number =
                    first_number.saturating_sub(self.branch_resolution_request_size);
                BranchResolution {
                    blocks: Vec::new(),
                    displaced: Vec::new(),
                    ommer_candidate: None,
                    invalidate: Some(Invalidate {
                        from_number,
                        reason: "unknown branch".to_string(),
                        with_blacklist: true,
                    }),
                }
            }
            BranchClassification::InvalidBranch => {
                warn!(target: "importer", from = first_number, "invalid branch");
                BranchResolution {
                    blocks: Vec::new(),
                    displaced: Vec::new(),
                    ommer_candidate: None,
                    invalidate: Some(Invalidate {
                        from_number: first_number,
                        reason: "invalid branch".to_string(),
                        with_blacklist: true,
                    }),
                }
            }
        }
    }
}
