//! Query handlers for the World session context.
//!
//! Queries reconstitute the World from its session stream and return
//! read-only view DTOs. They never write.

use loreweave_core::aggregate::AggregateRoot;
use loreweave_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::errors::SessionError;
use crate::domain::phase::Phase;

/// Read-only view of a registered player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    /// External player identity.
    pub player_id: String,
    /// Chat platform handle.
    pub display_name: String,
    /// In-world character name.
    pub character_name: String,
    /// Roster role, once chosen.
    pub role: Option<String>,
    /// Whether the player has submitted a choice for the current round.
    pub has_submitted_round: bool,
}

/// Read-only view of a session's World.
#[derive(Debug, Clone, Serialize)]
pub struct WorldStatusView {
    /// The session stream identifier.
    pub session_id: Uuid,
    /// Identity of the current World; `None` until one is opened.
    pub world_id: Option<Uuid>,
    /// Current phase.
    pub phase: Phase,
    /// Role names in roster order.
    pub roster: Vec<String>,
    /// Maximum number of players.
    pub capacity: usize,
    /// Players in registration order.
    pub players: Vec<PlayerView>,
    /// Roles currently held.
    pub roles_taken: Vec<String>,
    /// Roster roles nobody holds yet.
    pub available_roles: Vec<String>,
    /// Current round; 0 until the game starts.
    pub current_round: u32,
    /// Character names still expected to submit this round. Empty outside
    /// `RUNNING`.
    pub awaiting: Vec<String>,
    /// The narrative state text.
    pub world_state: String,
    /// Current version (event count of the session stream).
    pub version: i64,
}

/// Retrieves the status of the World in a session. A session that never
/// opened a World reports an empty `SETUP` view with no World identity.
///
/// # Errors
///
/// Returns `SessionError::Domain` if loading or deserialization fails.
pub async fn get_world_status(
    session_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<WorldStatusView, SessionError> {
    let world = command_handlers::load_world(session_id, repo).await?;

    let players: Vec<PlayerView> = world
        .players()
        .iter()
        .map(|p| PlayerView {
            player_id: p.player_id.clone(),
            display_name: p.display_name.clone(),
            character_name: p.character_name.clone(),
            role: p.role.clone(),
            has_submitted_round: world.round_choices().contains_key(&p.character_name),
        })
        .collect();

    let awaiting = if world.phase() == Phase::Running {
        players
            .iter()
            .filter(|p| !p.has_submitted_round)
            .map(|p| p.character_name.clone())
            .collect()
    } else {
        Vec::new()
    };

    let available_roles = world
        .roster()
        .iter()
        .filter(|role| !world.roles_taken().contains(*role))
        .cloned()
        .collect();

    Ok(WorldStatusView {
        session_id,
        world_id: world.world_id(),
        phase: world.phase(),
        roster: world.roster().to_vec(),
        capacity: world.capacity(),
        players,
        roles_taken: world.roles_taken().iter().cloned().collect(),
        available_roles,
        current_round: world.current_round(),
        awaiting,
        world_state: world.world_state().to_owned(),
        version: world.version(),
    })
}
