//! [`PoolSynchronizer`] (C5, §4.5): applies an import outcome's side-effects to the ommer pool,
//! the pending-tx pool, and the broadcaster.

use tracing::debug;

use crate::model::{Block, BlockWithTd};

/// Effects a [`PoolSynchronizer`] run produces, for a caller to dispatch to its collaborators.
#[derive(Debug)]
pub struct PoolEffects<B: Block> {
    /// Headers to add to the ommer pool (displaced tip, if any, first).
    pub ommers_added: Vec<B::Header>,
    /// Headers to remove from the ommer pool (newly-canonical blocks and their uncles).
    pub ommers_removed: Vec<B::Header>,
    /// Transactions to return to the pending pool (from displaced blocks).
    pub transactions_added: Vec<B::Transaction>,
    /// Transactions to drop from the pending pool (now included in a canonical block).
    pub transactions_removed: Vec<B::Transaction>,
}

/// Reconciles the ommer pool, pending-tx pool, and broadcaster against an import outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolSynchronizer;

impl PoolSynchronizer {
    /// Compute the pool effects of `added` becoming canonical and `removed` being displaced
    /// (§4.5). Only the head of `removed` can contribute an ommer header — deeper displaced
    /// blocks are no longer a direct sibling of the new chain.
    #[must_use]
    pub fn synchronize<B: Block>(&self, added: &[B], removed: &[B]) -> PoolEffects<B> {
        let mut ommers_added = Vec::new();
        let mut transactions_added = Vec::new();

        if let Some(head) = removed.first() {
            debug!(target: "importer", "offering displaced tip as ommer candidate");
            ommers_added.push(head.header());
        }
        for block in removed {
            transactions_added.extend(block.transactions());
        }

        let mut ommers_removed = Vec::new();
        let mut transactions_removed = Vec::new();
        for block in added {
            ommers_removed.push(block.header());
            ommers_removed.extend(block.uncles());
            transactions_removed.extend(block.transactions());
        }

        PoolEffects { ommers_added, ommers_removed, transactions_added, transactions_removed }
    }

    /// Convenience for the single-block successful-import path: derive `added` from a chain of
    /// newly-canonical blocks with no displaced branch.
    #[must_use]
    pub fn synchronize_chain<B: Block>(&self, chain: &[BlockWithTd<B>]) -> PoolEffects<B> {
        let added: Vec<B> = chain.iter().map(|b| b.block.clone()).collect();
        self.synchronize(&added, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockHeader;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct TestHeader(u64);

    impl BlockHeader for TestHeader {
        fn number(&self) -> u64 {
            self.0
        }
        fn block_hash(&self) -> [u8; 32] {
            let mut h = [0u8; 32];
            h[0..8].copy_from_slice(&self.0.to_be_bytes());
            h
        }
    }

    #[derive(Debug, Clone)]
    struct TestBlock {
        number: u64,
        transactions: Vec<u64>,
        uncles: Vec<TestHeader>,
    }

    impl TestBlock {
        fn new(number: u64, transactions: Vec<u64>, uncles: Vec<u64>) -> Self {
            Self { number, transactions, uncles: uncles.into_iter().map(TestHeader).collect() }
        }
    }

    impl Block for TestBlock {
        type Header = TestHeader;
        type Transaction = u64;

        fn number(&self) -> u64 {
            self.number
        }
        fn header(&self) -> Self::Header {
            TestHeader(self.number)
        }
        fn transactions(&self) -> Vec<Self::Transaction> {
            self.transactions.clone()
        }
        fn uncles(&self) -> Vec<Self::Header> {
            self.uncles.clone()
        }
    }

    #[test]
    fn only_displaced_head_becomes_an_ommer_candidate() {
        let removed =
            vec![TestBlock::new(2, vec![20], vec![]), TestBlock::new(1, vec![10], vec![])];
        let effects = PoolSynchronizer.synchronize::<TestBlock>(&[], &removed);
        assert_eq!(effects.ommers_added.len(), 1);
        assert_eq!(effects.ommers_added[0].0, 2);
        assert_eq!(effects.transactions_added, vec![20, 10]);
    }

    #[test]
    fn added_blocks_remove_their_own_header_and_uncles() {
        let added = vec![TestBlock::new(3, vec![30], vec![99])];
        let effects = PoolSynchronizer.synchronize::<TestBlock>(&added, &[]);
        assert_eq!(effects.ommers_removed.len(), 2);
        assert!(effects.ommers_removed.contains(&TestHeader(3)));
        assert!(effects.ommers_removed.contains(&TestHeader(99)));
        assert_eq!(effects.transactions_removed, vec![30]);
        assert!(effects.ommers_added.is_empty());
        assert!(effects.transactions_added.is_empty());
    }

    #[test]
    fn empty_removed_yields_no_ommer_candidate() {
        let added = vec![TestBlock::new(1, vec![], vec![])];
        let effects = PoolSynchronizer.synchronize::<TestBlock>(&added, &[]);
        assert!(effects.ommers_added.is_empty());
        assert!(effects.transactions_added.is_empty());
    }
}
