//! The `import` subcommand: runs the importer actor against in-memory demonstration
//! collaborators. There is no real network or persistent ledger behind this binary; it exists to
//! exercise the control loop end-to-end, not to sync a real chain.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chain_importer_service::{
    DemoBlock, DemoHeader, DemoLedger, ImporterActor, ImporterConfig,
    collaborators::demo::{InMemoryOmmerPool, InMemoryTxPool, LoggingBroadcaster, NullFetcher},
};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the block importer against in-memory demonstration collaborators.
#[derive(Args, Clone, Debug)]
pub(crate) struct ImportCommand {
    /// How often, in seconds, to self-prompt for the next batch when otherwise idle.
    #[arg(long, env = "IMPORTER_SYNC_RETRY_INTERVAL", default_value_t = 5)]
    pub sync_retry_interval_secs: u64,
    /// Lookback window used when a branch's ancestry is unknown.
    #[arg(long, env = "IMPORTER_BRANCH_RESOLUTION_REQUEST_SIZE", default_value_t = 64)]
    pub branch_resolution_request_size: u64,
    /// Whether a missing trie node should trigger repair rather than be treated as fatal.
    #[arg(long, env = "IMPORTER_REDOWNLOAD_MISSING_STATE_NODES", default_value_t = true)]
    pub redownload_missing_state_nodes: bool,
    /// Number of demonstration blocks to feed through the actor before shutting down.
    #[arg(long, default_value_t = 10)]
    pub demo_block_count: u64,
}

impl ImportCommand {
    /// Runs the importer actor until the demonstration chain is exhausted or ctrl-c is pressed.
    pub(crate) async fn run(self) -> Result<()> {
        let config = ImporterConfig {
            sync_retry_interval: Duration::from_secs(self.sync_retry_interval_secs),
            branch_resolution_request_size: self.branch_resolution_request_size,
            redownload_missing_state_nodes: self.redownload_missing_state_nodes,
        };

        let ledger = Arc::new(DemoLedger::new());
        let fetcher = Arc::new(NullFetcher);
        let ommer_pool = Arc::new(InMemoryOmmerPool::<DemoHeader>::default());
        let tx_pool = Arc::new(InMemoryTxPool::<u64>::default());
        let broadcaster = Arc::new(LoggingBroadcaster);
        let cancellation = CancellationToken::new();

        let (handle, actor) = ImporterActor::new(
            ledger,
            fetcher,
            ommer_pool,
            tx_pool,
            broadcaster,
            config,
            cancellation.clone(),
        );

        let actor_task = tokio::spawn(actor.start());

        handle.on_tip().await?;
        let blocks: Vec<DemoBlock> =
            (1..=self.demo_block_count).map(|number| DemoBlock::new(number, Vec::new())).collect();
        info!(target: "import", count = blocks.len(), "feeding demonstration batch");
        handle.picked_blocks(blocks).await?;

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancellation.cancel();
        actor_task.await??;
        Ok(())
    }
}
