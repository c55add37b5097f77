//! Config entry state machine
//!
//! ```text
//! NotLoaded -> SetupInProgress -> Loaded
//!                              \-> SetupError -> SetupInProgress (set up again)
//!
//! Loaded/SetupError -> UnloadInProgress -> NotLoaded
//! ```

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
                | (SetupInProgress, Loaded)
                | (SetupInProgress, SetupError)
                | (SetupError, SetupInProgress)
                | (SetupError, UnloadInProgress)
                | (Loaded, UnloadInProgress)
                | (UnloadInProgress, NotLoaded)
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

    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        self.try_transition(to).is_ok()
    }

    fn transition_error_reason(from: ConfigEntryState, to: ConfigEntryState) -> &'static str {
        use ConfigEntryState::*;

        match (from, to) {
            (SetupInProgress, _) => "setup in progress",
            (UnloadInProgress, _) => "unload in progress",
            (NotLoaded, Loaded) | (NotLoaded, SetupError) => {
                "must go through SetupInProgress"
            }
            (Loaded, NotLoaded) => "must go through UnloadInProgress",
            (Loaded, SetupInProgress) => "already loaded, unload first",
            _ => "invalid state transition",
        }
    }
}
