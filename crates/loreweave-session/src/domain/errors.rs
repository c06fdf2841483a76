//! Session error taxonomy.
//!
//! Every variant except `Domain` is a business-rule rejection: the World is
//! left unchanged and the caller reports the message to the actor.

use loreweave_core::error::DomainError;
use thiserror::Error;

use super::phase::Phase;

/// Failures returned by World session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Setup was attempted on a World that already left setup.
    #[error("world already initialized (phase {0})")]
    AlreadyInitialized(Phase),

    /// Roster, capacity, lore or rules failed validation.
    #[error("incomplete setup: {0}")]
    IncompleteSetup(String),

    /// Registration is not open in the current phase.
    #[error("registration closed (phase {0})")]
    RegistrationClosed(Phase),

    /// Another player already uses this character name.
    #[error("character name already taken: {0}")]
    NameTaken(String),

    /// Every seat is filled.
    #[error("all {capacity} seats are taken")]
    CapacityReached {
        /// The World's capacity.
        capacity: usize,
        /// The role roster, for display to the rejected player.
        roster: Vec<String>,
    },

    /// The character name is blank.
    #[error("character name must not be blank")]
    InvalidCharacterName,

    /// The player has not registered in this World.
    #[error("player not registered: {0}")]
    NotRegistered(String),

    /// The player already holds a role.
    #[error("role already chosen: {0}")]
    RoleAlreadyChosen(String),

    /// The role is taken or not on the roster.
    #[error("role unavailable: {0}")]
    RoleUnavailable(String),

    /// The submitted choice is outside the alphabet.
    #[error("invalid choice: {0:?}")]
    InvalidChoice(String),

    /// The player already submitted a choice this round.
    #[error("choice already submitted for round {0}")]
    DuplicateSubmission(u32),

    /// The operation is not allowed in the current phase.
    #[error("operation not allowed in phase {0}")]
    WrongPhase(Phase),

    /// No World exists, or the World the operation started on was reset.
    #[error("world not found")]
    WorldNotFound,

    /// Persistence failure or an unresolved write conflict.
    #[error(transparent)]
    Domain(#[from] DomainError),
}
