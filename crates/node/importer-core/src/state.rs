//! [`ImporterState`]: the small value object C1 describes (§3, §4.1).

/// Whether the importer believes it is at chain tip, and whether an import is in flight.
///
/// A pure value: every transition returns a new value rather than mutating in place, matching
/// how this codebase threads state through a `watch` channel instead of sharing a mutable cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImporterState {
    on_tip: bool,
    importing: bool,
}

impl ImporterState {
    /// The initial state: not on tip, nothing in flight.
    #[must_use]
    pub const fn initial() -> Self {
        Self { on_tip: false, importing: false }
    }

    /// Whether the fetcher last reported that we're caught up to network tip.
    #[must_use]
    pub const fn on_tip(self) -> bool {
        self.on_tip
    }

    /// Whether an import future is currently in flight.
    #[must_use]
    pub const fn importing(self) -> bool {
        self.importing
    }

    /// Whether a mined or peer-broadcast single block may be accepted right now (§3).
    #[must_use]
    pub const fn accepts_single_block(self) -> bool {
        self.on_tip && !self.importing
    }

    /// Record an `OnTip` signal.
    #[must_use]
    pub const fn set_on_tip(self) -> Self {
        Self { on_tip: true, ..self }
    }

    /// Record a `NotOnTop` signal.
    #[must_use]
    pub const fn clear_on_tip(self) -> Self {
        Self { on_tip: false, ..self }
    }

    /// Mark an import as dispatched.
    #[must_use]
    pub const fn begin_import(self) -> Self {
        Self { importing: true, ..self }
    }

    /// Mark the in-flight import as complete.
    #[must_use]
    pub const fn end_import(self) -> Self {
        Self { importing: false, ..self }
    }
}
