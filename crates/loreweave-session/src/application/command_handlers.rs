//! Command handlers for the World session context.
//!
//! Every handler runs load, decide, commit against the session stream. A
//! commit that loses the version race is retried from a fresh load, so a
//! racing request either succeeds on top of the winner's state or fails with
//! the business error that state implies.

use loreweave_core::aggregate::AggregateRoot;
use loreweave_core::clock::Clock;
use loreweave_core::command::Command;
use loreweave_core::error::DomainError;
use loreweave_core::event::{DomainEvent, EventMetadata};
use loreweave_core::narration::NarrationRequest;
use loreweave_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::narration::NarrationService;
use crate::domain::aggregates::{Registration, RoundNarration, World};
use crate::domain::choice::Choice;
use crate::domain::commands::{
    AssignRole, InitializeFromRolePrompt, InitializeWorld, OpenWorld, RegisterPlayer, ResetWorld,
    SubmitChoice,
};
use crate::domain::errors::SessionError;
use crate::domain::events::{WorldEvent, WorldEventKind};
use crate::domain::phase::Phase;
use crate::domain::roster::extract_roster;

/// How many times a command is decided and committed before a version
/// conflict is reported to the caller.
pub const MAX_COMMIT_ATTEMPTS: usize = 8;

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct SessionCommandResult<T> {
    /// The session stream the command was applied to.
    pub aggregate_id: Uuid,
    /// Identity of the World the command acted on.
    pub world_id: Uuid,
    /// Command-specific outcome.
    pub outcome: T,
    /// The stored events produced and persisted. Empty for no-op commands.
    pub stored_events: Vec<StoredEvent>,
}

/// Outcome of a setup command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Registration is open with this roster.
    Ready {
        /// The validated roster.
        roster: Vec<String>,
    },
    /// No roles were found; the World is in `FAILED_SETUP`.
    Failed {
        /// Why setup failed.
        reason: String,
    },
}

/// Outcome of a role assignment.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The player that took the role.
    pub player_id: String,
    /// The role in roster spelling.
    pub role: String,
    /// Phase after the assignment.
    pub phase: Phase,
    /// Opening narration, when this assignment started the game.
    pub opening: Option<RoundNarration>,
}

/// A round closed by the submission that completed it.
#[derive(Debug, Clone)]
pub struct CompletedRound {
    /// The round that closed.
    pub round: u32,
    /// The narration committed for it.
    pub narration: RoundNarration,
}

/// Outcome of a choice submission.
#[derive(Debug, Clone)]
pub struct ChoiceAck {
    /// Round the choice was recorded for.
    pub round: u32,
    /// The submitting character.
    pub character_name: String,
    /// The recorded choice.
    pub choice: Choice,
    /// Phase after the submission.
    pub phase: Phase,
    /// Set when this submission completed the round.
    pub completed: Option<CompletedRound>,
}

/// Outcome of a reset.
#[derive(Debug, Clone, Copy)]
pub struct ResetOutcome {
    /// The discarded World, if there was one.
    pub previous_world_id: Option<Uuid>,
}

/// Reconstitutes a `World` from its session stream.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    session_id: Uuid,
    stored_events: &[StoredEvent],
) -> Result<World, DomainError> {
    let mut world = World::new(session_id);
    for stored in stored_events {
        let kind: WorldEventKind =
            serde_json::from_value(stored.payload.clone()).map_err(|e| {
                DomainError::Infrastructure(format!("event deserialization failed: {e}"))
            })?;
        world.apply(&WorldEvent {
            metadata: EventMetadata::from(stored),
            kind,
        });
    }
    Ok(world)
}

pub(crate) async fn load_world(
    session_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<World, DomainError> {
    let stored_events = repo.load_events(session_id).await?;
    reconstitute(session_id, &stored_events)
}

/// Appends the World's uncommitted events at its loaded version.
async fn commit(
    world: &mut World,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    if !world.has_uncommitted_events() {
        return Ok(Vec::new());
    }
    let stored_events: Vec<StoredEvent> = world
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_stored)
        .collect();
    repo.append_events(world.id, world.version(), &stored_events)
        .await?;
    world.mark_committed();
    Ok(stored_events)
}

/// Swallows a version conflict while attempts remain; anything else is
/// returned to the caller.
fn retry_on_conflict(
    err: DomainError,
    attempt: usize,
    command: &dyn Command,
) -> Result<(), SessionError> {
    if err.is_concurrency_conflict() && attempt < MAX_COMMIT_ATTEMPTS {
        debug!(
            command_type = command.command_type(),
            session_id = %command.stream_id(),
            attempt,
            error = %err,
            "commit lost the version race, retrying"
        );
        return Ok(());
    }
    Err(err.into())
}

/// Runs a synchronous decision against a fresh load until its events commit.
async fn execute<T>(
    command: &dyn Command,
    repo: &dyn EventRepository,
    mut decide: impl FnMut(&mut World) -> Result<T, SessionError> + Send,
) -> Result<SessionCommandResult<T>, SessionError> {
    let session_id = command.stream_id();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut world = load_world(session_id, repo).await?;
        let outcome = decide(&mut world)?;
        let world_id = world.ensure_identity(None)?;

        match commit(&mut world, repo).await {
            Ok(stored_events) => {
                return Ok(SessionCommandResult {
                    aggregate_id: session_id,
                    world_id,
                    outcome,
                    stored_events,
                });
            }
            Err(err) => retry_on_conflict(err, attempt, command)?,
        }
    }
}

/// Reuses the narration from an earlier attempt when the request has not
/// changed, so a retried commit does not call the narrator twice.
async fn narrate_once(
    cache: &mut Option<(NarrationRequest, RoundNarration)>,
    narration: &NarrationService,
    request: NarrationRequest,
) -> RoundNarration {
    if let Some((cached_request, cached)) = cache.as_ref() {
        if *cached_request == request {
            return cached.clone();
        }
    }
    let fresh = narration.narrate(&request).await;
    *cache = Some((request, fresh.clone()));
    fresh
}

/// Handles the `OpenWorld` command: creates an empty World in `SETUP`.
///
/// # Errors
///
/// Returns `SessionError::AlreadyInitialized` if a World exists, or
/// `SessionError::Domain` if loading or appending fails.
pub async fn handle_open_world(
    command: &OpenWorld,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<SessionCommandResult<()>, SessionError> {
    let result = execute(command, repo, |world| {
        world.open(command.correlation_id, clock).map(|_| ())
    })
    .await?;

    info!(
        session_id = %command.session_id,
        world_id = %result.world_id,
        "world opened"
    );
    Ok(result)
}

/// Handles the `InitializeWorld` command: validates the configuration and
/// opens registration.
///
/// # Errors
///
/// Returns `AlreadyInitialized` or `IncompleteSetup`, or
/// `SessionError::Domain` if loading or appending fails.
pub async fn handle_initialize_world(
    command: &InitializeWorld,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<SessionCommandResult<SetupOutcome>, SessionError> {
    let result = execute(command, repo, |world| {
        world.initialize(
            &command.roster,
            command.capacity,
            &command.lore,
            &command.rules,
            command.correlation_id,
            clock,
        )?;
        Ok(SetupOutcome::Ready {
            roster: world.roster().to_vec(),
        })
    })
    .await?;

    info!(
        session_id = %command.session_id,
        world_id = %result.world_id,
        capacity = command.capacity,
        phase = %Phase::AwaitingPlayers,
        "setup completed"
    );
    Ok(result)
}

/// Handles the `InitializeFromRolePrompt` command: extracts the roster from
/// the prompt and runs setup with it. A prompt without numbered roles moves
/// the World to `FAILED_SETUP` and reports [`SetupOutcome::Failed`].
///
/// # Errors
///
/// Returns `AlreadyInitialized` or `IncompleteSetup`, or
/// `SessionError::Domain` if loading or appending fails.
pub async fn handle_initialize_from_role_prompt(
    command: &InitializeFromRolePrompt,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<SessionCommandResult<SetupOutcome>, SessionError> {
    let roster = extract_roster(&command.role_prompt);

    let result = execute(command, repo, |world| {
        if roster.is_empty() {
            let reason = "no numbered roles found in the role prompt".to_owned();
            world.fail_setup(reason.clone(), command.correlation_id, clock)?;
            return Ok(SetupOutcome::Failed { reason });
        }
        world.initialize(
            &roster,
            command.capacity,
            &command.lore,
            &command.rules,
            command.correlation_id,
            clock,
        )?;
        Ok(SetupOutcome::Ready {
            roster: world.roster().to_vec(),
        })
    })
    .await?;

    match &result.outcome {
        SetupOutcome::Ready { roster } => info!(
            session_id = %command.session_id,
            world_id = %result.world_id,
            roles = roster.len(),
            "setup completed from role prompt"
        ),
        SetupOutcome::Failed { reason } => warn!(
            session_id = %command.session_id,
            world_id = %result.world_id,
            reason,
            "setup failed"
        ),
    }
    Ok(result)
}

/// Handles the `RegisterPlayer` command. Registering an already registered
/// player id is a no-op that returns the existing player.
///
/// # Errors
///
/// Returns `WorldNotFound`, `RegistrationClosed`, `CapacityReached`,
/// `InvalidCharacterName` or `NameTaken`, or `SessionError::Domain` if
/// loading or appending fails.
pub async fn handle_register_player(
    command: &RegisterPlayer,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<SessionCommandResult<Registration>, SessionError> {
    let mut pinned = command.world_id;

    let result = execute(command, repo, |world| {
        pinned = Some(world.ensure_identity(pinned)?);
        world.register(
            &command.player_id,
            &command.character_name,
            &command.display_name,
            command.correlation_id,
            clock,
        )
    })
    .await?;

    if !result.stored_events.is_empty() {
        info!(
            session_id = %command.session_id,
            world_id = %result.world_id,
            player_id = %command.player_id,
            character_name = %result.outcome.player.character_name,
            phase = %result.outcome.phase,
            "player registered"
        );
    }
    Ok(result)
}

/// Handles the `AssignRole` command. The assignment that gives every player a
/// role also fetches the opening narration and starts round 1 in the same
/// commit.
///
/// # Errors
///
/// Returns `WorldNotFound`, `WrongPhase`, `NotRegistered`,
/// `RoleAlreadyChosen` or `RoleUnavailable`, or `SessionError::Domain` if
/// loading or appending fails.
pub async fn handle_assign_role(
    command: &AssignRole,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    narration: &NarrationService,
) -> Result<SessionCommandResult<Assignment>, SessionError> {
    let mut pinned = command.world_id;
    let mut cached = None;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut world = load_world(command.session_id, repo).await?;
        let world_id = world.ensure_identity(pinned)?;
        pinned = Some(world_id);

        let assignment =
            world.assign_role(&command.player_id, &command.role, command.correlation_id, clock)?;
        let opening = if assignment.roster_complete {
            let opening = narrate_once(&mut cached, narration, world.opening_request()).await;
            world.start_game(opening.clone(), command.correlation_id, clock)?;
            Some(opening)
        } else {
            None
        };

        match commit(&mut world, repo).await {
            Ok(stored_events) => {
                info!(
                    session_id = %command.session_id,
                    %world_id,
                    player_id = %assignment.player_id,
                    role = %assignment.role,
                    "role assigned"
                );
                if let Some(opening) = &opening {
                    info!(
                        session_id = %command.session_id,
                        %world_id,
                        phase = %world.phase(),
                        fallback = opening.fallback,
                        "every role assigned, round 1 started"
                    );
                }
                return Ok(SessionCommandResult {
                    aggregate_id: command.session_id,
                    world_id,
                    outcome: Assignment {
                        player_id: assignment.player_id,
                        role: assignment.role,
                        phase: world.phase(),
                        opening,
                    },
                    stored_events,
                });
            }
            Err(err) => retry_on_conflict(err, attempt, command)?,
        }
    }
}

/// Handles the `SubmitChoice` command. The submission that completes the
/// round also fetches the round's narration and advances the World in the
/// same commit.
///
/// # Errors
///
/// Returns `WorldNotFound`, `WrongPhase`, `InvalidChoice`, `NotRegistered`
/// or `DuplicateSubmission`, or `SessionError::Domain` if loading or
/// appending fails.
pub async fn handle_submit_choice(
    command: &SubmitChoice,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    narration: &NarrationService,
) -> Result<SessionCommandResult<ChoiceAck>, SessionError> {
    let mut pinned = command.world_id;
    let mut cached = None;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut world = load_world(command.session_id, repo).await?;
        let world_id = world.ensure_identity(pinned)?;
        pinned = Some(world_id);

        let submitted = world.submit_choice(
            &command.player_id,
            &command.choice,
            command.correlation_id,
            clock,
        )?;
        let completed = if submitted.round_complete {
            let narration = narrate_once(&mut cached, narration, world.round_request()).await;
            let round = world.advance_round(narration.clone(), command.correlation_id, clock)?;
            Some(CompletedRound { round, narration })
        } else {
            None
        };

        match commit(&mut world, repo).await {
            Ok(stored_events) => {
                debug!(
                    session_id = %command.session_id,
                    %world_id,
                    round = submitted.round,
                    character_name = %submitted.character_name,
                    "choice recorded"
                );
                if let Some(completed) = &completed {
                    info!(
                        session_id = %command.session_id,
                        %world_id,
                        round = completed.round,
                        fallback = completed.narration.fallback,
                        phase = %world.phase(),
                        "round completed"
                    );
                }
                return Ok(SessionCommandResult {
                    aggregate_id: command.session_id,
                    world_id,
                    outcome: ChoiceAck {
                        round: submitted.round,
                        character_name: submitted.character_name,
                        choice: submitted.choice,
                        phase: world.phase(),
                        completed,
                    },
                    stored_events,
                });
            }
            Err(err) => retry_on_conflict(err, attempt, command)?,
        }
    }
}

/// Handles the `ResetWorld` command: discards the World, if any, and opens a
/// fresh one in `SETUP`.
///
/// # Errors
///
/// Returns `SessionError::Domain` if loading or appending fails.
pub async fn handle_reset_world(
    command: &ResetWorld,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<SessionCommandResult<ResetOutcome>, SessionError> {
    let result = execute(command, repo, |world| {
        let previous_world_id = world.world_id();
        world.reset(command.correlation_id, clock);
        Ok(ResetOutcome { previous_world_id })
    })
    .await?;

    info!(
        session_id = %command.session_id,
        world_id = %result.world_id,
        previous_world_id = ?result.outcome.previous_world_id,
        "world reset"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use loreweave_core::error::DomainError;
    use loreweave_event_store::memory_event_repository::InMemoryEventRepository;
    use loreweave_test_support::{
        ConflictingEventRepository, FailingEventRepository, FailingNarrator, FixedClock,
        RecordingEventRepository, StaticNarrator,
    };
    use uuid::Uuid;

    use super::*;
    use crate::domain::aggregates::{RegistrationStatus, session_stream_id};

    fn open(session_id: Uuid) -> OpenWorld {
        OpenWorld {
            correlation_id: Uuid::new_v4(),
            session_id,
        }
    }

    fn initialize(session_id: Uuid, roster: &[&str], capacity: usize) -> InitializeWorld {
        InitializeWorld {
            correlation_id: Uuid::new_v4(),
            session_id,
            roster: roster.iter().map(|r| (*r).to_owned()).collect(),
            capacity,
            lore: "A drowned city beneath a green moon.".into(),
            rules: "Choose A, B, C or D each round.".into(),
        }
    }

    fn register(session_id: Uuid, player_id: &str, character_name: &str) -> RegisterPlayer {
        RegisterPlayer {
            correlation_id: Uuid::new_v4(),
            session_id,
            world_id: None,
            player_id: player_id.into(),
            character_name: character_name.into(),
            display_name: format!("@{player_id}"),
        }
    }

    fn assign(session_id: Uuid, player_id: &str, role: &str) -> AssignRole {
        AssignRole {
            correlation_id: Uuid::new_v4(),
            session_id,
            world_id: None,
            player_id: player_id.into(),
            role: role.into(),
        }
    }

    fn submit(session_id: Uuid, player_id: &str, choice: &str) -> SubmitChoice {
        SubmitChoice {
            correlation_id: Uuid::new_v4(),
            session_id,
            world_id: None,
            player_id: player_id.into(),
            choice: choice.into(),
        }
    }

    fn event_types(events: &[StoredEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event_type.as_str()).collect()
    }

    /// Drives a two-player World into `RUNNING`.
    async fn running_world(
        session_id: Uuid,
        clock: &FixedClock,
        repo: &InMemoryEventRepository,
        narration: &NarrationService,
    ) {
        handle_initialize_world(&initialize(session_id, &["Warrior", "Mage"], 2), clock, repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "a", "Rogue"), clock, repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "b", "Shade"), clock, repo)
            .await
            .unwrap();
        handle_assign_role(&assign(session_id, "a", "Warrior"), clock, repo, narration)
            .await
            .unwrap();
        handle_assign_role(&assign(session_id, "b", "Mage"), clock, repo, narration)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_open_world_persists_world_opened_event() {
        // Arrange
        let session_id = session_stream_id("group-1");
        let clock = FixedClock::default_instant();
        let repo = RecordingEventRepository::new(Vec::new());
        let command = open(session_id);

        // Act
        let result = handle_open_world(&command, &clock, &repo).await.unwrap();

        // Assert
        let appended = repo.appended_events();
        assert_eq!(appended.len(), 1);

        let (agg_id, expected_version, events) = &appended[0];
        assert_eq!(*agg_id, session_id);
        assert_eq!(*expected_version, 0);
        assert_eq!(event_types(events), ["session.world_opened"]);

        let stored = &events[0];
        assert_eq!(stored.sequence_number, 1);
        assert_eq!(stored.correlation_id, command.correlation_id);
        assert_eq!(stored.causation_id, command.correlation_id);
        assert_eq!(stored.occurred_at, clock.0);
        assert_eq!(
            stored.payload["WorldOpened"]["world_id"],
            result.world_id.to_string()
        );
    }

    #[tokio::test]
    async fn test_handle_open_world_rejects_second_open() {
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        handle_open_world(&open(session_id), &clock, &repo)
            .await
            .unwrap();

        let result = handle_open_world(&open(session_id), &clock, &repo).await;

        assert!(matches!(
            result,
            Err(SessionError::AlreadyInitialized(Phase::Setup))
        ));
    }

    #[tokio::test]
    async fn test_handle_initialize_world_opens_world_when_absent() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();

        // Act
        let result = handle_initialize_world(
            &initialize(session_id, &[" Warrior ", "Mage"], 2),
            &clock,
            &repo,
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(
            event_types(&result.stored_events),
            ["session.world_opened", "session.setup_completed"]
        );
        assert_eq!(
            result.outcome,
            SetupOutcome::Ready {
                roster: vec!["Warrior".into(), "Mage".into()]
            }
        );
        let world = load_world(session_id, &repo).await.unwrap();
        assert_eq!(world.phase(), Phase::AwaitingPlayers);
        assert_eq!(world.world_id(), Some(result.world_id));
    }

    #[tokio::test]
    async fn test_handle_initialize_world_rejects_capacity_larger_than_roster() {
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();

        let result =
            handle_initialize_world(&initialize(session_id, &["Warrior"], 3), &clock, &repo).await;

        assert!(matches!(result, Err(SessionError::IncompleteSetup(_))));
        assert!(repo.load_events(session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_initialize_world_rejects_second_setup() {
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        handle_initialize_world(&initialize(session_id, &["Warrior"], 1), &clock, &repo)
            .await
            .unwrap();

        let result =
            handle_initialize_world(&initialize(session_id, &["Mage"], 1), &clock, &repo).await;

        assert!(matches!(
            result,
            Err(SessionError::AlreadyInitialized(Phase::AwaitingPlayers))
        ));
    }

    #[tokio::test]
    async fn test_handle_initialize_from_role_prompt_extracts_roster() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let command = InitializeFromRolePrompt {
            correlation_id: Uuid::new_v4(),
            session_id,
            role_prompt: "Roles:\n1. THE HUNTER (HUMAN)\n2. THE ORACLE\n".into(),
            capacity: 2,
            lore: "Fog over the moors.".into(),
            rules: "One choice per round.".into(),
        };

        // Act
        let result = handle_initialize_from_role_prompt(&command, &clock, &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(
            result.outcome,
            SetupOutcome::Ready {
                roster: vec!["THE HUNTER".into(), "THE ORACLE".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_handle_initialize_from_role_prompt_without_roles_fails_setup_recoverably() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let mut command = InitializeFromRolePrompt {
            correlation_id: Uuid::new_v4(),
            session_id,
            role_prompt: "There are no roles here.".into(),
            capacity: 1,
            lore: "Fog over the moors.".into(),
            rules: "One choice per round.".into(),
        };

        // Act
        let failed = handle_initialize_from_role_prompt(&command, &clock, &repo)
            .await
            .unwrap();
        command.role_prompt = "1. THE HUNTER".into();
        let recovered = handle_initialize_from_role_prompt(&command, &clock, &repo)
            .await
            .unwrap();

        // Assert
        assert!(matches!(failed.outcome, SetupOutcome::Failed { .. }));
        assert_eq!(
            event_types(&failed.stored_events),
            ["session.world_opened", "session.setup_failed"]
        );
        assert_eq!(recovered.world_id, failed.world_id);
        assert_eq!(
            event_types(&recovered.stored_events),
            ["session.setup_completed"]
        );
    }

    #[tokio::test]
    async fn test_handle_register_player_is_idempotent_per_player_id() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        handle_initialize_world(&initialize(session_id, &["Warrior", "Mage"], 2), &clock, &repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "a", "Rogue"), &clock, &repo)
            .await
            .unwrap();

        // Act
        let again = handle_register_player(&register(session_id, "a", "Other"), &clock, &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(again.outcome.status, RegistrationStatus::AlreadyRegistered);
        assert_eq!(again.outcome.player.character_name, "Rogue");
        assert!(again.stored_events.is_empty());
        assert_eq!(repo.load_events(session_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_handle_register_player_fails_without_world() {
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();

        let result =
            handle_register_player(&register(Uuid::new_v4(), "a", "Rogue"), &clock, &repo).await;

        assert!(matches!(result, Err(SessionError::WorldNotFound)));
    }

    #[tokio::test]
    async fn test_handle_register_player_rejects_stale_world_id() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let before = handle_initialize_world(&initialize(session_id, &["Warrior"], 1), &clock, &repo)
            .await
            .unwrap();
        handle_reset_world(
            &ResetWorld {
                correlation_id: Uuid::new_v4(),
                session_id,
            },
            &clock,
            &repo,
        )
        .await
        .unwrap();
        let mut command = register(session_id, "a", "Rogue");
        command.world_id = Some(before.world_id);

        // Act
        let result = handle_register_player(&command, &clock, &repo).await;

        // Assert
        assert!(matches!(result, Err(SessionError::WorldNotFound)));
    }

    #[tokio::test]
    async fn test_handle_register_player_filling_last_seat_opens_role_selection() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        handle_initialize_world(&initialize(session_id, &["Warrior", "Mage"], 2), &clock, &repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "a", "Rogue"), &clock, &repo)
            .await
            .unwrap();

        // Act
        let result = handle_register_player(&register(session_id, "b", "Shade"), &clock, &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(result.outcome.phase, Phase::RoleSelection);
        assert_eq!(
            event_types(&result.stored_events),
            ["session.player_registered", "session.role_selection_opened"]
        );
    }

    #[tokio::test]
    async fn test_handle_assign_role_starts_game_with_opening_narration() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let narrator = Arc::new(StaticNarrator::new("The tide retreats."));
        let narration = NarrationService::new(narrator.clone(), Duration::from_secs(1));
        handle_initialize_world(&initialize(session_id, &["Warrior", "Mage"], 2), &clock, &repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "a", "Rogue"), &clock, &repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "b", "Shade"), &clock, &repo)
            .await
            .unwrap();

        // Act
        let first = handle_assign_role(&assign(session_id, "a", "warrior"), &clock, &repo, &narration)
            .await
            .unwrap();
        let second = handle_assign_role(&assign(session_id, "b", "Mage"), &clock, &repo, &narration)
            .await
            .unwrap();

        // Assert
        assert_eq!(first.outcome.role, "Warrior");
        assert_eq!(first.outcome.phase, Phase::RoleSelection);
        assert!(first.outcome.opening.is_none());

        assert_eq!(second.outcome.phase, Phase::Running);
        assert_eq!(
            second.outcome.opening.map(|o| o.text),
            Some("The tide retreats.".to_owned())
        );
        assert_eq!(
            event_types(&second.stored_events),
            ["session.role_assigned", "session.game_started"]
        );
        assert_eq!(narrator.calls(), 1);

        let world = load_world(session_id, &repo).await.unwrap();
        assert_eq!(world.current_round(), 1);
        assert_eq!(world.world_state(), "The tide retreats.");
    }

    #[tokio::test]
    async fn test_handle_assign_role_rejects_taken_role() {
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let narration = NarrationService::fallback_only();
        handle_initialize_world(&initialize(session_id, &["Warrior", "Mage"], 2), &clock, &repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "a", "Rogue"), &clock, &repo)
            .await
            .unwrap();
        handle_register_player(&register(session_id, "b", "Shade"), &clock, &repo)
            .await
            .unwrap();
        handle_assign_role(&assign(session_id, "a", "Warrior"), &clock, &repo, &narration)
            .await
            .unwrap();

        let result =
            handle_assign_role(&assign(session_id, "b", "WARRIOR"), &clock, &repo, &narration)
                .await;

        assert!(matches!(result, Err(SessionError::RoleUnavailable(role)) if role == "Warrior"));
    }

    #[tokio::test]
    async fn test_handle_submit_choice_waits_for_every_player() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let narration = NarrationService::fallback_only();
        running_world(session_id, &clock, &repo, &narration).await;

        // Act
        let result = handle_submit_choice(&submit(session_id, "a", " a "), &clock, &repo, &narration)
            .await
            .unwrap();

        // Assert
        assert_eq!(result.outcome.round, 1);
        assert_eq!(result.outcome.choice, Choice::A);
        assert!(result.outcome.completed.is_none());
        assert_eq!(event_types(&result.stored_events), ["session.choice_submitted"]);

        let world = load_world(session_id, &repo).await.unwrap();
        assert_eq!(world.round_choices().get("Rogue"), Some(&Choice::A));
        assert_eq!(world.current_round(), 1);
    }

    #[tokio::test]
    async fn test_handle_submit_choice_last_submission_advances_round() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let narrator = Arc::new(StaticNarrator::new("The gates open."));
        let narration = NarrationService::new(narrator.clone(), Duration::from_secs(1));
        running_world(session_id, &clock, &repo, &narration).await;
        handle_submit_choice(&submit(session_id, "a", "A"), &clock, &repo, &narration)
            .await
            .unwrap();

        // Act
        let result = handle_submit_choice(&submit(session_id, "b", "b"), &clock, &repo, &narration)
            .await
            .unwrap();

        // Assert
        let completed = result.outcome.completed.unwrap();
        assert_eq!(completed.round, 1);
        assert_eq!(completed.narration.text, "The gates open.");
        assert_eq!(result.outcome.phase, Phase::Running);
        assert_eq!(
            event_types(&result.stored_events),
            ["session.choice_submitted", "session.round_advanced"]
        );
        // opening + one round
        assert_eq!(narrator.calls(), 2);

        let world = load_world(session_id, &repo).await.unwrap();
        assert_eq!(world.current_round(), 2);
        assert!(world.round_choices().is_empty());
        assert_eq!(world.world_state(), "The gates open.");
    }

    #[tokio::test]
    async fn test_handle_submit_choice_uses_fallback_when_narrator_fails() {
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let narration = NarrationService::new(Arc::new(FailingNarrator), Duration::from_secs(1));
        running_world(session_id, &clock, &repo, &narration).await;
        handle_submit_choice(&submit(session_id, "a", "A"), &clock, &repo, &narration)
            .await
            .unwrap();

        let result = handle_submit_choice(&submit(session_id, "b", "B"), &clock, &repo, &narration)
            .await
            .unwrap();

        let completed = result.outcome.completed.unwrap();
        assert!(completed.narration.fallback);
        assert_eq!(
            completed.narration.text,
            "Round 1 ends. Rogue chose A. Shade chose B."
        );
    }

    #[tokio::test]
    async fn test_handle_submit_choice_concluding_narration_completes_game() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        running_world(session_id, &clock, &repo, &NarrationService::fallback_only()).await;
        let ending = NarrationService::new(
            Arc::new(StaticNarrator::concluding("The city sleeps.")),
            Duration::from_secs(1),
        );
        handle_submit_choice(&submit(session_id, "a", "C"), &clock, &repo, &ending)
            .await
            .unwrap();

        // Act
        let result = handle_submit_choice(&submit(session_id, "b", "D"), &clock, &repo, &ending)
            .await
            .unwrap();

        // Assert
        assert_eq!(result.outcome.phase, Phase::Completed);
        assert_eq!(
            event_types(&result.stored_events),
            [
                "session.choice_submitted",
                "session.round_advanced",
                "session.game_concluded"
            ]
        );
        let late = handle_submit_choice(&submit(session_id, "a", "A"), &clock, &repo, &ending).await;
        assert!(matches!(late, Err(SessionError::WrongPhase(Phase::Completed))));
    }

    #[tokio::test]
    async fn test_handle_submit_choice_rejects_duplicate_and_invalid_choices() {
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let narration = NarrationService::fallback_only();
        running_world(session_id, &clock, &repo, &narration).await;
        handle_submit_choice(&submit(session_id, "a", "A"), &clock, &repo, &narration)
            .await
            .unwrap();

        let duplicate =
            handle_submit_choice(&submit(session_id, "a", "B"), &clock, &repo, &narration).await;
        let invalid =
            handle_submit_choice(&submit(session_id, "b", "E"), &clock, &repo, &narration).await;
        let stranger =
            handle_submit_choice(&submit(session_id, "z", "A"), &clock, &repo, &narration).await;

        assert!(matches!(duplicate, Err(SessionError::DuplicateSubmission(1))));
        assert!(matches!(invalid, Err(SessionError::InvalidChoice(_))));
        assert!(matches!(stranger, Err(SessionError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn test_handle_reset_world_discards_players_and_issues_new_identity() {
        // Arrange
        let session_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = InMemoryEventRepository::new();
        let narration = NarrationService::fallback_only();
        running_world(session_id, &clock, &repo, &narration).await;
        let before = load_world(session_id, &repo).await.unwrap().world_id();

        // Act
        let result = handle_reset_world(
            &ResetWorld {
                correlation_id: Uuid::new_v4(),
                session_id,
            },
            &clock,
            &repo,
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(result.outcome.previous_world_id, before);
        assert_ne!(Some(result.world_id), before);
        let world = load_world(session_id, &repo).await.unwrap();
        assert_eq!(world.phase(), Phase::Setup);
        assert!(world.players().is_empty());
        assert_eq!(world.current_round(), 0);
    }

    #[tokio::test]
    async fn test_commit_gives_up_after_max_attempts() {
        // Arrange
        let clock = FixedClock::default_instant();
        let repo = ConflictingEventRepository::new(Vec::new());

        // Act
        let result = handle_open_world(&open(Uuid::new_v4()), &clock, &repo).await;

        // Assert
        assert!(matches!(
            result,
            Err(SessionError::Domain(DomainError::ConcurrencyConflict { .. }))
        ));
        assert_eq!(repo.append_attempts(), MAX_COMMIT_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_infrastructure_failure_is_not_retried() {
        let clock = FixedClock::default_instant();

        let result = handle_open_world(&open(Uuid::new_v4()), &clock, &FailingEventRepository).await;

        assert!(matches!(
            result,
            Err(SessionError::Domain(DomainError::Infrastructure(_)))
        ));
    }

    #[test]
    fn test_reconstitute_rejects_unknown_payload() {
        let session_id = Uuid::new_v4();
        let stored = StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: session_id,
            event_type: "session.mystery".into(),
            payload: serde_json::json!({ "Mystery": {} }),
            sequence_number: 1,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: FixedClock::default_instant().0,
        };

        let result = reconstitute(session_id, &[stored]);

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}
