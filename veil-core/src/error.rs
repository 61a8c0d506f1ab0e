//! Domain-specific error types for the privacy controller.
//!
//! Only [`StartError`] ever reaches the caller of
//! [`PrivacyController::start`](crate::PrivacyController::start).
//! Everything else is a typed, non-fatal value that call sites inspect,
//! log and continue past.

use thiserror::Error;

use crate::profile::OverlayLayer;

// ── HostError ────────────────────────────────────────────────────

/// Failure reported by one of the host collaborators.
#[derive(Debug, Error)]
pub enum HostError {
    /// The host refused the operation (missing permission, policy).
    #[error("denied by host: {0}")]
    Denied(String),

    /// The host rejected the request itself (e.g. unsupported surface type).
    #[error("rejected by host: {0}")]
    Rejected(String),

    /// The underlying service is not reachable right now.
    #[error("host service unavailable: {0}")]
    Unavailable(String),

    /// Host I/O failed.
    #[error("host i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ── StartError ───────────────────────────────────────────────────

/// Errors that abort [`start`](crate::PrivacyController::start).
#[derive(Debug, Error)]
pub enum StartError {
    /// The elevated-overlay capability is not granted. The capability
    /// has been requested; the caller should retry once it is granted.
    #[error("overlay capability missing")]
    CapabilityMissing,

    /// Every candidate overlay strategy was rejected by the compositor.
    #[error("all {} overlay strategies exhausted", attempts.len())]
    AllStrategiesExhausted {
        /// One entry per rejected strategy, in attempt order.
        attempts: Vec<StrategyRejected>,
    },
}

/// One rejected compositor-insertion attempt.
#[derive(Debug, Error)]
#[error("{layer} strategy (alpha {alpha}) rejected: {reason}")]
pub struct StrategyRejected {
    /// Insertion layer of the rejected spec.
    pub layer: OverlayLayer,
    /// Alpha of the rejected spec.
    pub alpha: u8,
    /// Why the compositor refused it.
    pub reason: HostError,
}

// ── BrightnessError ──────────────────────────────────────────────

/// Non-fatal brightness override failures.
#[derive(Debug, Error)]
pub enum BrightnessError {
    /// The capability to write display configuration is not granted.
    #[error("display settings write capability unavailable")]
    WriteUnavailable,

    /// The current brightness could not be read, so nothing was touched.
    #[error("failed to read current brightness: {0}")]
    ReadFailed(#[source] HostError),

    /// The host refused the brightness write.
    #[error("brightness write denied: {0}")]
    WriteDenied(#[source] HostError),
}

// ── Teardown ─────────────────────────────────────────────────────

/// One resource that could not be released during teardown.
#[derive(Debug, Error)]
pub enum TeardownFailure {
    /// Removing an installed surface failed.
    #[error("failed to remove surface {surface}: {reason}")]
    Surface { surface: u64, reason: HostError },

    /// Re-applying the brightness snapshot failed.
    #[error("failed to restore brightness: {0}")]
    Brightness(#[source] HostError),

    /// Clearing the persisted snapshot failed.
    #[error("failed to clear persisted snapshot: {0}")]
    Snapshot(#[source] VeilError),
}

/// Outcome of a best-effort teardown: every resource was attempted,
/// these are the ones that failed.
#[derive(Debug, Default)]
#[must_use = "teardown failures must be inspected (logged) by the caller"]
pub struct TeardownReport {
    failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed release.
    pub fn push(&mut self, failure: TeardownFailure) {
        self.failures.push(failure);
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: TeardownReport) {
        self.failures.extend(other.failures);
    }

    /// `true` when every resource was released.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[TeardownFailure] {
        &self.failures
    }

    /// Emit one warning per failure.
    pub fn log(&self, context: &str) {
        for failure in &self.failures {
            tracing::warn!("{context}: {failure}");
        }
    }
}

// ── VeilError ────────────────────────────────────────────────────

/// The canonical error type for everything outside the start/teardown paths.
#[derive(Debug, Error)]
pub enum VeilError {
    /// A session phase transition was requested from the wrong phase.
    #[error("invalid session transition: {0}")]
    InvalidTransition(&'static str),

    /// An overlay spec violates a table invariant.
    #[error("invalid overlay spec: {0}")]
    InvalidSpec(&'static str),

    /// Snapshot persistence I/O failed.
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding or decoding failed.
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A host collaborator failed outside the start path.
    #[error("host error: {0}")]
    Host(#[from] HostError),
}
