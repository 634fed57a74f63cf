//! The importer's external collaborators (§6): fetcher, ommer pool, pending-tx pool, and
//! broadcaster. Each is reached only by message/call, never by shared mutable state.

use std::collections::HashMap;

use async_trait::async_trait;
use chain_importer_core::Block;

/// A block paired with its total difficulty, as broadcast to peers (§6).
#[derive(Debug, Clone)]
pub struct NewBlock<B: Block> {
    /// The block.
    pub block: B,
    /// Its total difficulty once canonical.
    pub total_difficulty: u128,
}

/// The block fetcher: requests and supplies blocks and trie nodes (§6).
#[async_trait]
pub trait Fetcher<B: Block>: Send + Sync {
    /// Tell the fetcher to begin syncing from `from_block_number`.
    async fn start(&self, from_block_number: u64);
    /// Request the next `count` blocks.
    async fn pick_blocks(&self, count: u64);
    /// Request a specific trie node by its keccak256 hash.
    async fn fetch_state_node(&self, hash: [u8; 32]);
    /// Invalidate (and trigger a re-fetch of) blocks from `from_number` onward.
    async fn invalidate_blocks_from(&self, from_number: u64, reason: String, with_blacklist: bool);
    /// Report that a peer-broadcast block failed import, for penalisation/diagnostics.
    async fn block_import_failed(&self, number: u64, reason: String);
}

/// The ommer (uncle) pool (§6).
#[async_trait]
pub trait OmmerPool<B: Block>: Send + Sync {
    /// Offer one header as an ommer candidate.
    async fn add_ommer(&self, header: B::Header);
    /// Remove headers that are no longer ommer candidates (now canonical, or superseded).
    async fn remove_ommers(&self, headers: Vec<B::Header>);
}

/// The pending-transactions pool (§6).
#[async_trait]
pub trait TxPool<B: Block>: Send + Sync {
    /// Return a set of transactions to the pending pool (e.g. from a displaced branch).
    async fn add_transactions(&self, transactions: Vec<B::Transaction>);
    /// Remove transactions now included in a canonical block.
    async fn remove_transactions(&self, transactions: Vec<B::Transaction>);
}

/// The peer broadcast fan-out (§6).
#[async_trait]
pub trait Broadcaster<B: Block>: Send + Sync {
    /// Broadcast newly-canonical blocks with their total difficulties.
    async fn broadcast_blocks(&self, blocks: Vec<NewBlock<B>>);
}

/// In-memory collaborator implementations suitable for tests and the demonstration binary.
pub mod demo {
    use std::sync::Mutex;

    use super::{Broadcaster, Fetcher, NewBlock, OmmerPool, TxPool};
    use chain_importer_core::Block;
    use tracing::debug;

    /// A no-op fetcher that only logs what it was asked to do.
    #[derive(Debug, Default)]
    pub struct NullFetcher;

    #[async_trait::async_trait]
    impl<B: Block> Fetcher<B> for NullFetcher {
        async fn start(&self, from_block_number: u64) {
            debug!(target: "fetcher", from_block_number, "start");
        }
        async fn pick_blocks(&self, count: u64) {
            debug!(target: "fetcher", count, "pick_blocks");
        }
        async fn fetch_state_node(&self, hash: [u8; 32]) {
            debug!(target: "fetcher", hash = %hex(&hash), "fetch_state_node");
        }
        async fn invalidate_blocks_from(
            &self,
            from_number: u64,
            reason: String,
            with_blacklist: bool,
        ) {
            debug!(target: "fetcher", from_number, reason, with_blacklist, "invalidate_blocks_from");
        }
        async fn block_import_failed(&self, number: u64, reason: String) {
            debug!(target: "fetcher", number, reason, "block_import_failed");
        }
    }

    /// An in-memory ommer pool, tracking candidates in a `Vec` behind a mutex.
    #[derive(Debug)]
    pub struct InMemoryOmmerPool<H> {
        candidates: Mutex<Vec<H>>,
    }

    impl<H> Default for InMemoryOmmerPool<H> {
        fn default() -> Self {
            Self { candidates: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl<B: Block> OmmerPool<B> for InMemoryOmmerPool<B::Header> {
        async fn add_ommer(&self, header: B::Header) {
            debug!(target: "ommer_pool", "add_ommer");
            self.candidates.lock().unwrap().push(header);
        }
        async fn remove_ommers(&self, headers: Vec<B::Header>) {
            debug!(target: "ommer_pool", removed = headers.len(), "remove_ommers");
            self.candidates.lock().unwrap().retain(|h| !headers.contains(h));
        }
    }

    /// An in-memory pending-transaction pool.
    #[derive(Debug)]
    pub struct InMemoryTxPool<T> {
        pending: Mutex<Vec<T>>,
    }

    impl<T> Default for InMemoryTxPool<T> {
        fn default() -> Self {
            Self { pending: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl<B: Block> TxPool<B> for InMemoryTxPool<B::Transaction> {
        async fn add_transactions(&self, transactions: Vec<B::Transaction>) {
            debug!(target: "tx_pool", added = transactions.len(), "add_transactions");
            self.pending.lock().unwrap().extend(transactions);
        }
        async fn remove_transactions(&self, transactions: Vec<B::Transaction>) {
            debug!(target: "tx_pool", removed = transactions.len(), "remove_transactions");
            self.pending.lock().unwrap().retain(|t| !transactions.contains(t));
        }
    }

    /// A broadcaster that only logs what it was asked to fan out.
    #[derive(Debug, Default)]
    pub struct LoggingBroadcaster;

    #[async_trait::async_trait]
    impl<B: Block> Broadcaster<B> for LoggingBroadcaster {
        async fn broadcast_blocks(&self, blocks: Vec<NewBlock<B>>) {
            debug!(target: "broadcaster", count = blocks.len(), "broadcast_blocks");
        }
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Exactly one node value used from a `FetchedStateNode` reply (§6: `.values().first()`).
#[must_use]
pub fn first_fetched_node(nodes: HashMap<[u8; 32], Vec<u8>>) -> Option<([u8; 32], Vec<u8>)> {
    nodes.into_iter().next()
}
