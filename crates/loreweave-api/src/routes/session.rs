//! Routes for the World session context.
//!
//! Every route is scoped by the external session key (e.g. a chat group id),
//! which maps to one session stream.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use loreweave_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use loreweave_session::application::command_handlers::{self, SessionCommandResult, SetupOutcome};
use loreweave_session::application::query_handlers::{self, WorldStatusView};
use loreweave_session::domain::aggregates::{RegistrationStatus, RoundNarration, session_stream_id};
use loreweave_session::domain::choice::Choice;
use loreweave_session::domain::commands;
use loreweave_session::domain::phase::Phase;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the admin token on admin routes.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Request body for POST /{session_key}/initialize.
#[derive(Debug, Deserialize)]
pub struct InitializeRequest {
    /// Role names available to players.
    pub roster: Vec<String>,
    /// Maximum number of players.
    pub capacity: usize,
    /// World lore.
    pub lore: String,
    /// Rules text.
    pub rules: String,
}

/// Request body for POST /{session_key}/initialize-from-prompt.
#[derive(Debug, Deserialize)]
pub struct InitializeFromPromptRequest {
    /// Free text listing roles as numbered lines.
    pub role_prompt: String,
    /// Maximum number of players.
    pub capacity: usize,
    /// World lore.
    pub lore: String,
    /// Rules text.
    pub rules: String,
}

/// Request body for POST /{session_key}/players.
#[derive(Debug, Deserialize)]
pub struct RegisterPlayerRequest {
    /// External player identity.
    pub player_id: String,
    /// Requested character name.
    pub character_name: String,
    /// Chat platform handle.
    #[serde(default)]
    pub display_name: String,
    /// The World the caller expects, if known.
    pub world_id: Option<Uuid>,
}

/// Request body for POST /{session_key}/roles.
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    /// The player picking a role.
    pub player_id: String,
    /// Requested role name.
    pub role: String,
    /// The World the caller expects, if known.
    pub world_id: Option<Uuid>,
}

/// Request body for POST /{session_key}/choices.
#[derive(Debug, Deserialize)]
pub struct SubmitChoiceRequest {
    /// The submitting player.
    pub player_id: String,
    /// One of `A`, `B`, `C`, `D`.
    pub choice: String,
    /// The World the caller expects, if known.
    pub world_id: Option<Uuid>,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse<T> {
    /// Identity of the World the command acted on.
    pub world_id: Uuid,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
    /// Command-specific fields.
    #[serde(flatten)]
    pub outcome: T,
}

impl<T> CommandResponse<T> {
    fn new<O>(result: SessionCommandResult<O>, outcome: impl FnOnce(O) -> T) -> Self {
        Self {
            world_id: result.world_id,
            event_ids: event_ids(&result.stored_events),
            outcome: outcome(result.outcome),
        }
    }
}

fn event_ids(events: &[StoredEvent]) -> Vec<Uuid> {
    events.iter().map(|e| e.event_id).collect()
}

/// Fields returned by POST /{session_key}/open.
#[derive(Debug, Serialize)]
pub struct OpenedView {
    /// Phase of the new World.
    pub phase: Phase,
}

/// Fields returned by the setup routes.
#[derive(Debug, Serialize)]
pub struct SetupView {
    /// Phase after setup.
    pub phase: Phase,
    /// The validated roster, when setup succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster: Option<Vec<String>>,
    /// Why setup failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<SetupOutcome> for SetupView {
    fn from(outcome: SetupOutcome) -> Self {
        match outcome {
            SetupOutcome::Ready { roster } => Self {
                phase: Phase::AwaitingPlayers,
                roster: Some(roster),
                reason: None,
            },
            SetupOutcome::Failed { reason } => Self {
                phase: Phase::FailedSetup,
                roster: None,
                reason: Some(reason),
            },
        }
    }
}

/// Fields returned by POST /{session_key}/players.
#[derive(Debug, Serialize)]
pub struct RegistrationView {
    /// External player identity.
    pub player_id: String,
    /// In-world character name.
    pub character_name: String,
    /// Chat platform handle.
    pub display_name: String,
    /// `registered` or `already_registered`.
    pub status: RegistrationStatus,
    /// Phase after the registration.
    pub phase: Phase,
}

/// Narration committed for a round.
#[derive(Debug, Serialize)]
pub struct NarrationView {
    /// The narration text; also the new world state.
    pub text: String,
    /// The built-in fallback was used.
    pub fallback: bool,
    /// The story ended.
    pub concluded: bool,
}

impl From<RoundNarration> for NarrationView {
    fn from(narration: RoundNarration) -> Self {
        Self {
            text: narration.text,
            fallback: narration.fallback,
            concluded: narration.concluded,
        }
    }
}

/// Fields returned by POST /{session_key}/roles.
#[derive(Debug, Serialize)]
pub struct AssignmentView {
    /// The player that took the role.
    pub player_id: String,
    /// The role in roster spelling.
    pub role: String,
    /// Phase after the assignment.
    pub phase: Phase,
    /// Opening narration, when this assignment started the game.
    pub opening: Option<NarrationView>,
}

/// A round closed by a submission.
#[derive(Debug, Serialize)]
pub struct CompletedRoundView {
    /// The round that closed.
    pub round: u32,
    /// The narration committed for it.
    pub narration: NarrationView,
}

/// Fields returned by POST /{session_key}/choices.
#[derive(Debug, Serialize)]
pub struct ChoiceView {
    /// Round the choice was recorded for.
    pub round: u32,
    /// The submitting character.
    pub character_name: String,
    /// The recorded choice.
    pub choice: Choice,
    /// Phase after the submission.
    pub phase: Phase,
    /// Set when this submission completed the round.
    pub completed: Option<CompletedRoundView>,
}

/// Fields returned by POST /{session_key}/reset.
#[derive(Debug, Serialize)]
pub struct ResetView {
    /// The discarded World, if there was one.
    pub previous_world_id: Option<Uuid>,
    /// Phase of the fresh World.
    pub phase: Phase,
}

/// Rejects the request unless it carries the configured admin token. Open
/// when no token is configured.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.admin_token else {
        return Ok(());
    };
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented == Some(expected.as_ref()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// GET /{session_key}
#[instrument(skip(state))]
async fn get_status(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Result<Json<WorldStatusView>, ApiError> {
    let view = query_handlers::get_world_status(
        session_stream_id(&session_key),
        &*state.event_repository,
    )
    .await?;
    Ok(Json(view))
}

/// POST /{session_key}/open
#[instrument(skip(state, headers))]
async fn open_world(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CommandResponse<OpenedView>>, ApiError> {
    require_admin(&state, &headers)?;
    let command = commands::OpenWorld {
        correlation_id: Uuid::new_v4(),
        session_id: session_stream_id(&session_key),
    };

    info!(correlation_id = %command.correlation_id, "handling open_world command");

    let result =
        command_handlers::handle_open_world(&command, state.clock.as_ref(), &*state.event_repository)
            .await?;

    Ok(Json(CommandResponse::new(result, |()| OpenedView {
        phase: Phase::Setup,
    })))
}

/// POST /{session_key}/initialize
#[instrument(skip(state, headers, request))]
async fn initialize(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    headers: HeaderMap,
    Json(request): Json<InitializeRequest>,
) -> Result<Json<CommandResponse<SetupView>>, ApiError> {
    require_admin(&state, &headers)?;
    let command = commands::InitializeWorld {
        correlation_id: Uuid::new_v4(),
        session_id: session_stream_id(&session_key),
        roster: request.roster,
        capacity: request.capacity,
        lore: request.lore,
        rules: request.rules,
    };

    info!(correlation_id = %command.correlation_id, "handling initialize_world command");

    let result = command_handlers::handle_initialize_world(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok(Json(CommandResponse::new(result, SetupView::from)))
}

/// POST /{session_key}/initialize-from-prompt
#[instrument(skip(state, headers, request))]
async fn initialize_from_prompt(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    headers: HeaderMap,
    Json(request): Json<InitializeFromPromptRequest>,
) -> Result<Json<CommandResponse<SetupView>>, ApiError> {
    require_admin(&state, &headers)?;
    let command = commands::InitializeFromRolePrompt {
        correlation_id: Uuid::new_v4(),
        session_id: session_stream_id(&session_key),
        role_prompt: request.role_prompt,
        capacity: request.capacity,
        lore: request.lore,
        rules: request.rules,
    };

    info!(
        correlation_id = %command.correlation_id,
        "handling initialize_from_role_prompt command"
    );

    let result = command_handlers::handle_initialize_from_role_prompt(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok(Json(CommandResponse::new(result, SetupView::from)))
}

/// POST /{session_key}/players
#[instrument(skip(state, request), fields(player_id = %request.player_id))]
async fn register_player(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    Json(request): Json<RegisterPlayerRequest>,
) -> Result<Json<CommandResponse<RegistrationView>>, ApiError> {
    let command = commands::RegisterPlayer {
        correlation_id: Uuid::new_v4(),
        session_id: session_stream_id(&session_key),
        world_id: request.world_id,
        player_id: request.player_id,
        character_name: request.character_name,
        display_name: request.display_name,
    };

    info!(correlation_id = %command.correlation_id, "handling register_player command");

    let result = command_handlers::handle_register_player(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok(Json(CommandResponse::new(result, |registration| {
        RegistrationView {
            player_id: registration.player.player_id,
            character_name: registration.player.character_name,
            display_name: registration.player.display_name,
            status: registration.status,
            phase: registration.phase,
        }
    })))
}

/// POST /{session_key}/roles
#[instrument(skip(state, request), fields(player_id = %request.player_id))]
async fn assign_role(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    Json(request): Json<AssignRoleRequest>,
) -> Result<Json<CommandResponse<AssignmentView>>, ApiError> {
    let command = commands::AssignRole {
        correlation_id: Uuid::new_v4(),
        session_id: session_stream_id(&session_key),
        world_id: request.world_id,
        player_id: request.player_id,
        role: request.role,
    };

    info!(correlation_id = %command.correlation_id, "handling assign_role command");

    let result = command_handlers::handle_assign_role(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
        &state.narration,
    )
    .await?;

    Ok(Json(CommandResponse::new(result, |assignment| {
        AssignmentView {
            player_id: assignment.player_id,
            role: assignment.role,
            phase: assignment.phase,
            opening: assignment.opening.map(NarrationView::from),
        }
    })))
}

/// POST /{session_key}/choices
#[instrument(skip(state, request), fields(player_id = %request.player_id))]
async fn submit_choice(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    Json(request): Json<SubmitChoiceRequest>,
) -> Result<Json<CommandResponse<ChoiceView>>, ApiError> {
    let command = commands::SubmitChoice {
        correlation_id: Uuid::new_v4(),
        session_id: session_stream_id(&session_key),
        world_id: request.world_id,
        player_id: request.player_id,
        choice: request.choice,
    };

    info!(correlation_id = %command.correlation_id, "handling submit_choice command");

    let result = command_handlers::handle_submit_choice(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
        &state.narration,
    )
    .await?;

    Ok(Json(CommandResponse::new(result, |ack| ChoiceView {
        round: ack.round,
        character_name: ack.character_name,
        choice: ack.choice,
        phase: ack.phase,
        completed: ack.completed.map(|completed| CompletedRoundView {
            round: completed.round,
            narration: completed.narration.into(),
        }),
    })))
}

/// POST /{session_key}/reset
#[instrument(skip(state, headers))]
async fn reset_world(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CommandResponse<ResetView>>, ApiError> {
    require_admin(&state, &headers)?;
    let command = commands::ResetWorld {
        correlation_id: Uuid::new_v4(),
        session_id: session_stream_id(&session_key),
    };

    info!(correlation_id = %command.correlation_id, "handling reset_world command");

    let result = command_handlers::handle_reset_world(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok(Json(CommandResponse::new(result, |reset| ResetView {
        previous_world_id: reset.previous_world_id,
        phase: Phase::Setup,
    })))
}

/// Returns the router for the session context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{session_key}", get(get_status))
        .route("/{session_key}/open", post(open_world))
        .route("/{session_key}/initialize", post(initialize))
        .route(
            "/{session_key}/initialize-from-prompt",
            post(initialize_from_prompt),
        )
        .route("/{session_key}/players", post(register_player))
        .route("/{session_key}/roles", post(assign_role))
        .route("/{session_key}/choices", post(submit_choice))
        .route("/{session_key}/reset", post(reset_world))
}
