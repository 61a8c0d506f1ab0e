//! Session lifecycle state machine.
//!
//! Transitions are validated and return `Result` instead of panicking.

use std::time::{Duration, Instant};

use crate::error::VeilError;

/// The current phase of the privacy session.
///
/// ```text
///  Inactive ──► Starting ──► Active ──► Stopping
///     ▲            │                       │
///     │            ▼ (aborted)             │
///     └────────────┴───────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session. Initial / terminal state.
    #[default]
    Inactive,

    /// Preconditions are being checked and the overlay installed.
    Starting,

    /// Overlay installed; brightness override applied if possible.
    Active {
        /// When the session became active.
        since: Instant,
    },

    /// Teardown in progress.
    Stopping,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "Inactive"),
            Self::Starting => write!(f, "Starting"),
            Self::Active { .. } => write!(f, "Active"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive)
    }

    /// How long the session has been active. `None` in any other phase.
    pub fn active_duration(&self) -> Option<Duration> {
        match self {
            Self::Active { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Inactive`.
    pub fn begin_start(&mut self) -> Result<(), VeilError> {
        match self {
            Self::Inactive => {
                *self = Self::Starting;
                Ok(())
            }
            _ => Err(VeilError::InvalidTransition(
                "cannot start: session not Inactive",
            )),
        }
    }

    /// Valid from: `Starting`.
    pub fn activate(&mut self) -> Result<(), VeilError> {
        match self {
            Self::Starting => {
                *self = Self::Active {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(VeilError::InvalidTransition(
                "cannot activate: session not Starting",
            )),
        }
    }

    /// Start aborted. Valid from: `Starting`.
    pub fn abort_start(&mut self) -> Result<(), VeilError> {
        match self {
            Self::Starting => {
                *self = Self::Inactive;
                Ok(())
            }
            _ => Err(VeilError::InvalidTransition(
                "cannot abort start: session not Starting",
            )),
        }
    }

    /// Valid from: `Active`.
    pub fn begin_stop(&mut self) -> Result<(), VeilError> {
        match self {
            Self::Active { .. } => {
                *self = Self::Stopping;
                Ok(())
            }
            _ => Err(VeilError::InvalidTransition(
                "cannot stop: session not Active",
            )),
        }
    }

    /// Valid from: `Stopping`.
    pub fn finish_stop(&mut self) -> Result<(), VeilError> {
        match self {
            Self::Stopping => {
                *self = Self::Inactive;
                Ok(())
            }
            _ => Err(VeilError::InvalidTransition(
                "cannot finish stop: session not Stopping",
            )),
        }
    }

    /// Force-reset to `Inactive` regardless of current state.
    pub fn force_reset(&mut self) {
        *self = Self::Inactive;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = SessionPhase::Inactive;

        phase.begin_start().unwrap();
        assert_eq!(phase, SessionPhase::Starting);

        phase.activate().unwrap();
        assert!(phase.is_active());
        assert!(phase.active_duration().is_some());

        phase.begin_stop().unwrap();
        assert_eq!(phase, SessionPhase::Stopping);

        phase.finish_stop().unwrap();
        assert!(phase.is_inactive());
    }

    #[test]
    fn aborted_start_returns_to_inactive() {
        let mut phase = SessionPhase::Inactive;
        phase.begin_start().unwrap();
        phase.abort_start().unwrap();
        assert!(phase.is_inactive());
    }

    #[test]
    fn start_when_active_is_rejected() {
        let mut phase = SessionPhase::Active {
            since: Instant::now(),
        };
        assert!(phase.begin_start().is_err());
        assert!(phase.is_active());
    }

    #[test]
    fn stop_when_inactive_is_rejected() {
        let mut phase = SessionPhase::Inactive;
        assert!(phase.begin_stop().is_err());
        assert!(phase.is_inactive());
    }

    #[test]
    fn cannot_abort_an_active_session() {
        let mut phase = SessionPhase::Active {
            since: Instant::now(),
        };
        assert!(phase.abort_start().is_err());
    }

    #[test]
    fn force_reset_from_any_state() {
        let mut phase = SessionPhase::Stopping;
        phase.force_reset();
        assert!(phase.is_inactive());
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionPhase::Inactive.to_string(), "Inactive");
        assert_eq!(SessionPhase::Starting.to_string(), "Starting");
        assert_eq!(
            SessionPhase::Active {
                since: Instant::now()
            }
            .to_string(),
            "Active"
        );
        assert_eq!(SessionPhase::Stopping.to_string(), "Stopping");
    }
}
