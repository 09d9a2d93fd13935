//! Config Entry State Machine
//!
//! Enforces valid state transitions for the ConfigEntry lifecycle:
//!
//! ```text
//! NotLoaded → SetupInProgress → Loaded
//!                            ↘ SetupError → SetupInProgress (manual retry)
//!                            ↘ SetupRetry → SetupInProgress (scheduled retry)
//!                            ↘ MigrationError (terminal)
//!
//! Loaded/SetupError/SetupRetry → UnloadInProgress → NotLoaded
//!                                                 ↘ FailedUnload (terminal)
//! ```

use std::time::Duration;

use crate::entry::ConfigEntryState;
use thiserror::Error;

/// Error when an invalid state transition is attempted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransition {
    pub from: ConfigEntryState,
    pub to: ConfigEntryState,
    pub reason: &'static str,
}

impl ConfigEntryState {
    /// Attempt a transition to a new state.
    pub fn try_transition(
        self,
        to: ConfigEntryState,
    ) -> Result<ConfigEntryState, InvalidTransition> {
        use ConfigEntryState::*;

        let valid = matches!(
            (self, to),
            (NotLoaded, SetupInProgress)
                | (SetupInProgress, Loaded | SetupError | SetupRetry | MigrationError)
                | (SetupError | SetupRetry, SetupInProgress | UnloadInProgress)
                | (Loaded, UnloadInProgress)
                | (UnloadInProgress, NotLoaded | FailedUnload)
        );

        if valid {
            Ok(to)
        } else {
            Err(InvalidTransition {
                from: self,
                to,
                reason: Self::transition_error_reason(self, to),
            })
        }
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        self.try_transition(to).is_ok()
    }

    fn transition_error_reason(from: ConfigEntryState, to: ConfigEntryState) -> &'static str {
        use ConfigEntryState::*;

        match (from, to) {
            (MigrationError, _) => "MigrationError is terminal - entry cannot recover",
            (FailedUnload, _) => "FailedUnload is terminal - entry cannot recover",
            (SetupInProgress, _) => "Setup in progress - must complete first",
            (UnloadInProgress, _) => "Unload in progress - must complete first",
            (NotLoaded, _) => "Entry not loaded - must go through SetupInProgress",
            (Loaded, SetupInProgress) => "Already loaded - unload first before re-setup",
            (Loaded, _) => "Entry loaded - must go through UnloadInProgress",
            _ => "Invalid state transition",
        }
    }
}

/// Delay before the next setup attempt of an entry that is not ready
///
/// `2^min(tries, 4) * 5` seconds plus up to 100ms of jitter, giving
/// 5s, 10s, 20s, 40s, 80s, then 80s forever.
pub fn calculate_retry_delay(tries: u32) -> Duration {
    let base_delay = 2_u64.pow(tries.min(4)) * 5;
    let jitter = rand::random::<f64>() * 0.1;
    Duration::from_secs_f64(base_delay as f64 + jitter)
}
