//! Counters and gauges behind the optional `metrics` feature (§12).
//!
//! Every function here is a no-op when the `metrics` feature is disabled, mirroring the
//! teacher crate's `metrics = { workspace = true, optional = true }` pattern.

/// A block was imported (either as part of a batch or a single-block path).
pub fn block_imported() {
    #[cfg(feature = "metrics")]
    metrics::counter!("importer_blocks_imported_total").increment(1);
}

/// A batch finished draining (successfully or with a fault).
pub fn batch_drained() {
    #[cfg(feature = "metrics")]
    metrics::counter!("importer_batches_drained_total").increment(1);
}

/// A chain reorganisation was applied.
pub fn reorg_applied() {
    #[cfg(feature = "metrics")]
    metrics::counter!("importer_reorgs_applied_total").increment(1);
}

/// A candidate branch was rejected during classification.
pub fn classification_rejected(kind: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!("importer_classification_rejected_total", "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// A missing-state-node repair cycle was started.
pub fn missing_node_repair_started() {
    #[cfg(feature = "metrics")]
    metrics::counter!("importer_missing_node_repairs_started_total").increment(1);
}

/// A missing-state-node repair cycle completed (the retried tail was re-imported).
pub fn missing_node_repair_completed() {
    #[cfg(feature = "metrics")]
    metrics::counter!("importer_missing_node_repairs_completed_total").increment(1);
}

/// A missing state node was observed on the single-block path, where it is only ever logged
/// (never recovered) — tracked separately so the batch/single-block asymmetry (§9) stays
/// observable instead of silent.
pub fn single_block_missing_node_observed() {
    #[cfg(feature = "metrics")]
    metrics::counter!("importer_single_block_missing_node_observed_total").increment(1);
}

/// Update the `importing` gauge.
pub fn set_importing(importing: bool) {
    #[cfg(feature = "metrics")]
    metrics::gauge!("importer_importing").set(if importing { 1.0 } else { 0.0 });
    #[cfg(not(feature = "metrics"))]
    let _ = importing;
}

/// Update the `on_tip` gauge.
pub fn set_on_tip(on_tip: bool) {
    #[cfg(feature = "metrics")]
    metrics::gauge!("importer_on_tip").set(if on_tip { 1.0 } else { 0.0 });
    #[cfg(not(feature = "metrics"))]
    let _ = on_tip;
}

/// Update the `ResolvingMissingNode` retry-queue-depth gauge.
pub fn set_repair_queue_depth(depth: usize) {
    #[cfg(feature = "metrics")]
    metrics::gauge!("importer_repair_queue_depth").set(depth as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = depth;
}
