//! World phases and the transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::SessionError;

/// Coarse stage of a World.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Created, waiting for roster and narrative configuration.
    Setup,
    /// Roster extraction failed; setup may be run again.
    FailedSetup,
    /// Accepting player registrations until capacity is reached.
    AwaitingPlayers,
    /// Every seat is filled; players are picking roles.
    RoleSelection,
    /// Rounds of choice submission and narration.
    Running,
    /// The narrator ended the story.
    Completed,
}

impl Phase {
    /// Returns `true` if `next` is a legal forward move from `self`.
    ///
    /// Reset is not listed here: it discards the World instead of
    /// transitioning it.
    #[must_use]
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::{AwaitingPlayers, Completed, FailedSetup, RoleSelection, Running, Setup};

        matches!(
            (self, next),
            (Setup | FailedSetup, AwaitingPlayers | FailedSetup)
                | (AwaitingPlayers, RoleSelection)
                | (RoleSelection | Running, Running)
                | (Running, Completed)
        )
    }

    /// Moves to `next`, rejecting illegal moves.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::WrongPhase` carrying the current phase when the
    /// move is not in the table.
    pub fn transition(self, next: Phase) -> Result<Phase, SessionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SessionError::WrongPhase(self))
        }
    }

    /// Returns `true` while setup may still be (re)run.
    #[must_use]
    pub fn accepts_setup(self) -> bool {
        matches!(self, Phase::Setup | Phase::FailedSetup)
    }

    /// Wire name of the phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "SETUP",
            Phase::FailedSetup => "FAILED_SETUP",
            Phase::AwaitingPlayers => "AWAITING_PLAYERS",
            Phase::RoleSelection => "ROLE_SELECTION",
            Phase::Running => "RUNNING",
            Phase::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
