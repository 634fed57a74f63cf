//! [`ImporterConfig`]: the recognised configuration options (§6, §13).

use std::time::Duration;

/// Configuration recognised by the [`crate::actor::ImporterActor`].
///
/// Batch size is intentionally absent: it is fixed at [`chain_importer_core::BATCH_SIZE`] (§6),
/// not user-configurable.
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Self-prompt period used to request the next batch when otherwise idle.
    pub sync_retry_interval: Duration,
    /// Lookback window used when a branch's ancestry is unknown.
    pub branch_resolution_request_size: u64,
    /// Whether a missing trie node should trigger repair (`true`) or be fatal (`false`).
    pub redownload_missing_state_nodes: bool,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            sync_retry_interval: Duration::from_secs(5),
            branch_resolution_request_size: 64,
            redownload_missing_state_nodes: true,
        }
    }
}
