//! Domain events for the World session context.

use std::collections::BTreeMap;

use loreweave_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::choice::Choice;

/// Emitted when an empty World is created in `SETUP`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldOpened {
    /// Identity of the new World.
    pub world_id: Uuid,
}

/// Emitted when setup succeeds and registration opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCompleted {
    /// The World identifier.
    pub world_id: Uuid,
    /// Validated role names.
    pub roster: Vec<String>,
    /// Maximum number of players.
    pub capacity: usize,
    /// World lore.
    pub lore: String,
    /// Rules text.
    pub rules: String,
}

/// Emitted when roster extraction found no roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupFailed {
    /// The World identifier.
    pub world_id: Uuid,
    /// Why setup failed.
    pub reason: String,
}

/// Emitted when a player claims a seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRegistered {
    /// The World identifier.
    pub world_id: Uuid,
    /// External player identity.
    pub player_id: String,
    /// In-world character name.
    pub character_name: String,
    /// Chat platform handle.
    pub display_name: String,
}

/// Emitted together with the registration that filled the last seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSelectionOpened {
    /// The World identifier.
    pub world_id: Uuid,
}

/// Emitted when a player takes a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssigned {
    /// The World identifier.
    pub world_id: Uuid,
    /// The player taking the role.
    pub player_id: String,
    /// The role, in roster spelling.
    pub role: String,
}

/// Emitted together with the assignment that gave every player a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStarted {
    /// The World identifier.
    pub world_id: Uuid,
    /// The first round number.
    pub round: u32,
    /// Opening narration; becomes the world state.
    pub narration: String,
    /// Whether the narration is the built-in fallback.
    pub fallback: bool,
}

/// Emitted when a player submits a choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceSubmitted {
    /// The World identifier.
    pub world_id: Uuid,
    /// The round the choice belongs to.
    pub round: u32,
    /// The submitting character.
    pub character_name: String,
    /// The choice.
    pub choice: Choice,
}

/// Emitted when every player has submitted and the story moved on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundAdvanced {
    /// The World identifier.
    pub world_id: Uuid,
    /// The round that just completed.
    pub completed_round: u32,
    /// Every submission of the completed round.
    pub choices: BTreeMap<String, Choice>,
    /// The new world state.
    pub narration: String,
    /// Whether the narration is the built-in fallback.
    pub fallback: bool,
}

/// Emitted when the narrator ends the story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConcluded {
    /// The World identifier.
    pub world_id: Uuid,
    /// The last round played.
    pub final_round: u32,
}

/// Emitted when the World is discarded and replaced by a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldReset {
    /// The discarded World, if there was one.
    pub previous_world_id: Option<Uuid>,
    /// Identity of the fresh World.
    pub world_id: Uuid,
}

/// Event type identifier for [`WorldOpened`].
pub const WORLD_OPENED_EVENT_TYPE: &str = "session.world_opened";

/// Event type identifier for [`SetupCompleted`].
pub const SETUP_COMPLETED_EVENT_TYPE: &str = "session.setup_completed";

/// Event type identifier for [`SetupFailed`].
pub const SETUP_FAILED_EVENT_TYPE: &str = "session.setup_failed";

/// Event type identifier for [`PlayerRegistered`].
pub const PLAYER_REGISTERED_EVENT_TYPE: &str = "session.player_registered";

/// Event type identifier for [`RoleSelectionOpened`].
pub const ROLE_SELECTION_OPENED_EVENT_TYPE: &str = "session.role_selection_opened";

/// Event type identifier for [`RoleAssigned`].
pub const ROLE_ASSIGNED_EVENT_TYPE: &str = "session.role_assigned";

/// Event type identifier for [`GameStarted`].
pub const GAME_STARTED_EVENT_TYPE: &str = "session.game_started";

/// Event type identifier for [`ChoiceSubmitted`].
pub const CHOICE_SUBMITTED_EVENT_TYPE: &str = "session.choice_submitted";

/// Event type identifier for [`RoundAdvanced`].
pub const ROUND_ADVANCED_EVENT_TYPE: &str = "session.round_advanced";

/// Event type identifier for [`GameConcluded`].
pub const GAME_CONCLUDED_EVENT_TYPE: &str = "session.game_concluded";

/// Event type identifier for [`WorldReset`].
pub const WORLD_RESET_EVENT_TYPE: &str = "session.world_reset";

/// Event payload variants for the World session context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorldEventKind {
    /// An empty World was created.
    WorldOpened(WorldOpened),
    /// Setup completed; registration is open.
    SetupCompleted(SetupCompleted),
    /// Setup failed.
    SetupFailed(SetupFailed),
    /// A player registered.
    PlayerRegistered(PlayerRegistered),
    /// All seats filled; role selection is open.
    RoleSelectionOpened(RoleSelectionOpened),
    /// A role was assigned.
    RoleAssigned(RoleAssigned),
    /// All roles assigned; the first round is running.
    GameStarted(GameStarted),
    /// A choice was submitted.
    ChoiceSubmitted(ChoiceSubmitted),
    /// A round completed.
    RoundAdvanced(RoundAdvanced),
    /// The story ended.
    GameConcluded(GameConcluded),
    /// The World was replaced by a fresh one.
    WorldReset(WorldReset),
}

impl WorldEventKind {
    /// Returns the event type name for this payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorldOpened(_) => WORLD_OPENED_EVENT_TYPE,
            Self::SetupCompleted(_) => SETUP_COMPLETED_EVENT_TYPE,
            Self::SetupFailed(_) => SETUP_FAILED_EVENT_TYPE,
            Self::PlayerRegistered(_) => PLAYER_REGISTERED_EVENT_TYPE,
            Self::RoleSelectionOpened(_) => ROLE_SELECTION_OPENED_EVENT_TYPE,
            Self::RoleAssigned(_) => ROLE_ASSIGNED_EVENT_TYPE,
            Self::GameStarted(_) => GAME_STARTED_EVENT_TYPE,
            Self::ChoiceSubmitted(_) => CHOICE_SUBMITTED_EVENT_TYPE,
            Self::RoundAdvanced(_) => ROUND_ADVANCED_EVENT_TYPE,
            Self::GameConcluded(_) => GAME_CONCLUDED_EVENT_TYPE,
            Self::WorldReset(_) => WORLD_RESET_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the World session context.
#[derive(Debug, Clone)]
pub struct WorldEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: WorldEventKind,
}

impl DomainEvent for WorldEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("WorldEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
