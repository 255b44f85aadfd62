//! Error types for the tracking pipeline.

use thiserror::Error;

use crate::types::ElementId;

/// A failure reported by a detection or mesh oracle for a single element.
///
/// Oracle failures are best-effort per element: the scanner logs and skips
/// the element rather than aborting the run.
#[derive(Debug, Clone, Error)]
#[error("oracle failure: {reason}")]
pub struct OracleError {
    /// Human readable description of the failure.
    pub reason: String,
}

impl OracleError {
    /// Create a new oracle error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Fatal errors of the feature connectivity engine.
#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    /// A union-find operation was called on an id that was never added.
    ///
    /// This is a programming contract violation of the caller; the
    /// union-find never silently creates phantom entries.
    #[error("element {0} was never added to the union-find")]
    UnknownElement(ElementId),

    /// A relation edge references an id that no partition ever scanned.
    #[error("scanner inconsistency: relation references unscanned element {0}")]
    ScannerInconsistency(ElementId),

    /// A coordinator message references an id unknown to the receiving rank.
    #[error("protocol violation: message references unknown element {0}")]
    ProtocolViolation(ElementId),

    /// The round safety cap was exceeded without reaching the fixpoint.
    #[error("no convergence after {rounds} rounds ({last_changes} changes in the last round)")]
    NonConvergence {
        /// Number of rounds executed.
        rounds: usize,
        /// Global change count observed in the last round.
        last_changes: usize,
    },

    /// Another rank reported a fatal error; this rank aborted with it.
    #[error("distributed run aborted by a peer rank")]
    PeerAbort,

    /// An oracle failed in a context where the element cannot be skipped.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}
