//! Import control loop for an Ethereum-family full node.
//!
//! This crate implements the core of a block importer: the state machine that serialises
//! imports, the branch-resolution arbiter, the per-block result dispatcher, and the
//! missing-state-node repair protocol. The ledger, fetcher, ommer pool, pending-tx pool, and
//! broadcaster are external collaborators reached only through the traits and channel-message
//! contracts in [`ledger`]; a production binary supplies real implementations (see the sibling
//! `chain-importer-service`/`chain-importer-cli` crates).

pub mod batch;
pub mod branch;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod pools;
pub mod repair;
pub mod single;
pub mod state;

pub use batch::{BatchImporter, BatchResult};
pub use branch::{BranchResolution, BranchResolver, Invalidate};
pub use error::{ImporterError, ImporterErrorSeverity, Severity};
pub use ledger::Ledger;
pub use model::{Block, BlockHeader, BlockWithTd, BranchClassification, Fault, ImportOutcome, LedgerFault};
pub use pools::{PoolEffects, PoolSynchronizer};
pub use repair::RepairContext;
pub use single::{SingleBlockEffect, SingleBlockImporter};
pub use state::ImporterState;

/// Number of blocks requested per fetch, fixed per §6 (not user-configurable).
pub const BATCH_SIZE: u64 = 50;
