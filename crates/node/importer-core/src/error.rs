//! Severities and collaborator-facing errors for the importer (§7, §11).

use derive_more::Display;

/// The severity tier an error is dispatched under, mirroring the engine task-queue idiom.
///
/// This distinguishes how the actor's dispatch loop reacts: a `Temporary` error is logged and
/// dropped, `Reset` drops back to a fresh `Running` state, `Flush` discards any buffered
/// repair context, and `Critical` is fatal to the actor (a supervisor restart is expected).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged and ignored; no state change.
    Temporary,
    /// The actor drops back to a fresh `Running` state.
    Reset,
    /// Any buffered repair context (`ResolvingMissingNode`) is discarded.
    Flush,
    /// Fatal: the actor stops and a supervisor is expected to restart it from `Idle`.
    Critical,
}

/// Implemented by every error type the importer can raise internally, so the actor's dispatch
/// loop can centralize severity handling in one place.
pub trait ImporterErrorSeverity {
    /// This error's severity tier.
    fn severity(&self) -> Severity;
}

/// Errors internal to the importer actor's own plumbing (not domain outcomes — those live in
/// [`crate::model::ImportOutcome`] and [`crate::model::Fault`] as plain data).
#[derive(Debug, thiserror::Error)]
pub enum ImporterError {
    /// A collaborator's inbox has been dropped; the corresponding channel is unusable.
    #[error("channel to collaborator closed: {0}")]
    ChannelClosed(&'static str),
    /// The ledger raised an exception outside the modeled domain outcomes.
    #[error("catastrophic ledger failure: {0}")]
    Catastrophic(String),
}

impl ImporterErrorSeverity for ImporterError {
    fn severity(&self) -> Severity {
        match self {
            Self::ChannelClosed(_) => Severity::Critical,
            Self::Catastrophic(_) => Severity::Critical,
        }
    }
}
