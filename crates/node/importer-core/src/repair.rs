//! [`RepairContext`]: tracks the un-imported tail of a batch while a missing trie node is
//! re-fetched (§3, §4.6).

use crate::model::Block;

/// Buffered state while the actor is in `ResolvingMissingNode`.
///
/// Created when a batch import faults with `MissingStateNode`; consumed on the first
/// `FetchedStateNode` reply, then discarded (§3).
#[derive(Debug, Clone)]
pub struct RepairContext<B: Block> {
    /// The blocks of the faulting batch that had not yet been imported.
    pub blocks_to_retry: Vec<B>,
}

impl<B: Block> RepairContext<B> {
    /// Construct a repair context from the un-imported tail of a batch.
    #[must_use]
    pub const fn new(blocks_to_retry: Vec<B>) -> Self {
        Self { blocks_to_retry }
    }

    /// The block number the faulted execution belongs to: the first block of the retry tail.
    ///
    /// Panics if `blocks_to_retry` is empty; a repair context is never constructed otherwise.
    #[must_use]
    pub fn repair_block_number(&self) -> u64 {
        self.blocks_to_retry
            .first()
            .expect("repair context always retains at least one block")
            .number()
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
    struct TestBlock(u64);

    impl Block for TestBlock {
        type Header = TestHeader;
        type Transaction = u64;

        fn number(&self) -> u64 {
            self.0
        }
        fn header(&self) -> Self::Header {
            TestHeader(self.0)
        }
        fn transactions(&self) -> Vec<Self::Transaction> {
            vec![]
        }
        fn uncles(&self) -> Vec<Self::Header> {
            vec![]
        }
    }

    #[test]
    fn repair_block_number_is_the_first_of_the_retry_tail() {
        let repair = RepairContext::new(vec![TestBlock(4), TestBlock(5)]);
        assert_eq!(repair.repair_block_number(), 4);
    }

    #[test]
    #[should_panic(expected = "at least one block")]
    fn empty_retry_tail_panics() {
        let repair: RepairContext<TestBlock> = RepairContext::new(Vec::new());
        let _ = repair.repair_block_number();
    }
}
