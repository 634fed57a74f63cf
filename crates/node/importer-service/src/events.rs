//! Inbound messages the [`crate::actor::ImporterActor`] processes through its single inbox.
//!
//! Producer events and the actor's own completion notices share one channel: this keeps the
//! single-writer invariant on `ImporterState` (§5) — an async import never mutates state
//! directly, it posts [`Inbound::ImportDone`] back through the same inbox it was dispatched from.

use std::collections::HashMap;

use chain_importer_core::{Block, RepairContext};

/// An event delivered to the importer actor's inbox.
#[derive(Debug)]
pub enum Inbound<B: Block> {
    /// The fetcher reports we've caught up to network tip.
    OnTip,
    /// The fetcher reports we've fallen behind tip.
    NotOnTop,
    /// The fetcher delivered the next batch to import.
    PickedBlocks(Vec<B>),
    /// The fetcher delivered trie nodes requested during repair.
    FetchedStateNode(HashMap<[u8; 32], Vec<u8>>),
    /// A block was mined locally.
    MinedBlock(B),
    /// A block arrived via peer broadcast.
    ImportNewBlock(B),
    /// An in-flight import (batch or single-block) completed.
    ImportDone(ImportDone<B>),
}

/// What the actor should transition to once an in-flight import completes.
#[derive(Debug)]
pub enum ImportDone<B: Block> {
    /// Return to ordinary `Running` dispatch.
    Running,
    /// Enter `ResolvingMissingNode`, buffering the un-imported tail of the faulting batch.
    ResolvingMissingNode(RepairContext<B>),
    /// A catastrophic ledger failure occurred; fatal to the actor (§7).
    Fatal(String),
}
