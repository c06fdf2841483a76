//! Aggregate root for the World session context.
//!
//! One session stream holds every World ever played under a session key.
//! A reset appends [`WorldReset`], which discards the current World and
//! starts a fresh one with a new identity.

use std::collections::{BTreeMap, BTreeSet};

use loreweave_core::aggregate::AggregateRoot;
use loreweave_core::clock::Clock;
use loreweave_core::error::DomainError;
use loreweave_core::event::EventMetadata;
use loreweave_core::narration::{CastMember, NarrationRequest};
use serde::Serialize;
use uuid::Uuid;

use super::choice::Choice;
use super::errors::SessionError;
use super::events::{
    ChoiceSubmitted, GameConcluded, GameStarted, PlayerRegistered, RoleAssigned,
    RoleSelectionOpened, RoundAdvanced, SetupCompleted, SetupFailed, WorldEvent, WorldEventKind,
    WorldOpened, WorldReset,
};
use super::phase::Phase;
use super::roster::normalize_roster;

/// Namespace for deriving session stream ids from session keys.
pub const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0x1f0c_9a52_7d3e_4b8a_9c61_2e4f_5a7b_8d90);

/// Maps an external session key (e.g. a chat group id) to its stream id.
#[must_use]
pub fn session_stream_id(session_key: &str) -> Uuid {
    Uuid::new_v5(&SESSION_NAMESPACE, session_key.as_bytes())
}

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    /// External player identity.
    pub player_id: String,
    /// Chat platform handle; informational only.
    pub display_name: String,
    /// In-world name, unique within the World (case-insensitive).
    pub character_name: String,
    /// Roster role, once chosen.
    pub role: Option<String>,
}

/// Whether a registration created a player or found an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// A new player was created.
    Registered,
    /// The player id was already registered; nothing changed.
    AlreadyRegistered,
}

/// Result of a registration decision.
#[derive(Debug, Clone)]
pub struct Registration {
    /// The new or existing player.
    pub player: Player,
    /// New or returning.
    pub status: RegistrationStatus,
    /// Phase after the registration.
    pub phase: Phase,
}

/// Result of a role assignment decision.
#[derive(Debug, Clone)]
pub struct RoleAssignment {
    /// The player that took the role.
    pub player_id: String,
    /// The role in roster spelling.
    pub role: String,
    /// Every player now holds a role.
    pub roster_complete: bool,
}

/// Result of a choice submission decision.
#[derive(Debug, Clone)]
pub struct SubmittedChoice {
    /// Round the choice was recorded for.
    pub round: u32,
    /// The submitting character.
    pub character_name: String,
    /// The choice.
    pub choice: Choice,
    /// Every player has now submitted for this round.
    pub round_complete: bool,
}

/// Narration ready to be committed for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundNarration {
    /// The new world state text.
    pub text: String,
    /// The narrator ended the story.
    pub concluded: bool,
    /// The text is the built-in fallback.
    pub fallback: bool,
}

/// The aggregate root for a session's World.
#[derive(Debug)]
pub struct World {
    /// Session stream identifier.
    pub id: Uuid,
    /// Persisted version (event count).
    pub(crate) version: i64,
    /// Identity of the current World; `None` until one is opened.
    pub(crate) world_id: Option<Uuid>,
    pub(crate) phase: Phase,
    pub(crate) roster: Vec<String>,
    pub(crate) roles_taken: BTreeSet<String>,
    /// Players in registration order.
    pub(crate) players: Vec<Player>,
    pub(crate) capacity: usize,
    pub(crate) current_round: u32,
    /// Character name to choice, for the current round only.
    pub(crate) round_choices: BTreeMap<String, Choice>,
    pub(crate) world_state: String,
    pub(crate) lore: String,
    pub(crate) rules: String,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<WorldEvent>,
}

impl World {
    /// Creates an empty session with no World.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            world_id: None,
            phase: Phase::Setup,
            roster: Vec::new(),
            roles_taken: BTreeSet::new(),
            players: Vec::new(),
            capacity: 0,
            current_round: 0,
            round_choices: BTreeMap::new(),
            world_state: String::new(),
            lore: String::new(),
            rules: String::new(),
            uncommitted_events: Vec::new(),
        }
    }

    /// Identity of the current World, if one exists.
    #[must_use]
    pub fn world_id(&self) -> Option<Uuid> {
        self.world_id
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Role names fixed at setup, in roster order.
    #[must_use]
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Maximum number of players.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current round; 0 until the game starts.
    #[must_use]
    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// Players in registration order.
    #[must_use]
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Submissions recorded for the current round.
    #[must_use]
    pub fn round_choices(&self) -> &BTreeMap<String, Choice> {
        &self.round_choices
    }

    /// Roles currently held.
    #[must_use]
    pub fn roles_taken(&self) -> &BTreeSet<String> {
        &self.roles_taken
    }

    /// The narrative state text.
    #[must_use]
    pub fn world_state(&self) -> &str {
        &self.world_state
    }

    /// Looks up a player by external id.
    #[must_use]
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    /// Returns the current World identity, failing if there is none or if it
    /// differs from the one the caller expects.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::WorldNotFound` in both cases.
    pub fn ensure_identity(&self, expected: Option<Uuid>) -> Result<Uuid, SessionError> {
        let current = self.world_id.ok_or(SessionError::WorldNotFound)?;
        match expected {
            Some(expected) if expected != current => Err(SessionError::WorldNotFound),
            _ => Ok(current),
        }
    }

    /// Creates an empty World in `SETUP`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyInitialized` if a World already exists.
    pub fn open(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<Uuid, SessionError> {
        if self.world_id.is_some() {
            return Err(SessionError::AlreadyInitialized(self.phase));
        }
        let world_id = Uuid::new_v4();
        self.record(
            WorldEventKind::WorldOpened(WorldOpened { world_id }),
            correlation_id,
            clock,
        );
        Ok(world_id)
    }

    /// Fixes roster, capacity, lore and rules and opens registration. Opens
    /// the World first if none exists.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyInitialized` outside `SETUP`/`FAILED_SETUP`,
    /// or `SessionError::IncompleteSetup` if any input fails validation.
    pub fn initialize<S: AsRef<str>>(
        &mut self,
        roster: &[S],
        capacity: usize,
        lore: &str,
        rules: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), SessionError> {
        self.ensure_setup_open()?;

        let roster = normalize_roster(roster)?;
        let lore = non_blank(lore, "lore")?;
        let rules = non_blank(rules, "rules")?;
        if capacity == 0 || capacity > roster.len() {
            return Err(SessionError::IncompleteSetup(format!(
                "capacity must be between 1 and {} (the roster size), got {capacity}",
                roster.len()
            )));
        }
        self.phase.transition(Phase::AwaitingPlayers)?;

        let world_id = self.open_if_absent(correlation_id, clock);
        self.record(
            WorldEventKind::SetupCompleted(SetupCompleted {
                world_id,
                roster,
                capacity,
                lore,
                rules,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Marks setup as failed so it can be run again.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyInitialized` outside `SETUP`/`FAILED_SETUP`.
    pub fn fail_setup(
        &mut self,
        reason: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), SessionError> {
        self.ensure_setup_open()?;
        self.phase.transition(Phase::FailedSetup)?;

        let world_id = self.open_if_absent(correlation_id, clock);
        self.record(
            WorldEventKind::SetupFailed(SetupFailed { world_id, reason }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Registers a player. Filling the last seat opens role selection in the
    /// same batch of events.
    ///
    /// # Errors
    ///
    /// Returns `WorldNotFound`, `RegistrationClosed`, `CapacityReached`,
    /// `InvalidCharacterName` or `NameTaken`. A player id that is already
    /// registered is not an error.
    pub fn register(
        &mut self,
        player_id: &str,
        character_name: &str,
        display_name: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Registration, SessionError> {
        let world_id = self.ensure_identity(None)?;

        if let Some(existing) = self.player(player_id) {
            return Ok(Registration {
                player: existing.clone(),
                status: RegistrationStatus::AlreadyRegistered,
                phase: self.phase,
            });
        }
        if self.phase.accepts_setup() {
            return Err(SessionError::RegistrationClosed(self.phase));
        }
        if self.players.len() >= self.capacity {
            return Err(SessionError::CapacityReached {
                capacity: self.capacity,
                roster: self.roster.clone(),
            });
        }
        if self.phase != Phase::AwaitingPlayers {
            return Err(SessionError::RegistrationClosed(self.phase));
        }

        let name = character_name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidCharacterName);
        }
        let folded = name.to_lowercase();
        if self
            .players
            .iter()
            .any(|p| p.character_name.to_lowercase() == folded)
        {
            return Err(SessionError::NameTaken(name.to_owned()));
        }

        let fills_last_seat = self.players.len() + 1 == self.capacity;
        if fills_last_seat {
            self.phase.transition(Phase::RoleSelection)?;
        }

        self.record(
            WorldEventKind::PlayerRegistered(PlayerRegistered {
                world_id,
                player_id: player_id.to_owned(),
                character_name: name.to_owned(),
                display_name: display_name.trim().to_owned(),
            }),
            correlation_id,
            clock,
        );
        if fills_last_seat {
            self.record(
                WorldEventKind::RoleSelectionOpened(RoleSelectionOpened { world_id }),
                correlation_id,
                clock,
            );
        }

        let player = self
            .player(player_id)
            .cloned()
            .ok_or_else(|| DomainError::Validation("registered player missing".into()))?;
        Ok(Registration {
            player,
            status: RegistrationStatus::Registered,
            phase: self.phase,
        })
    }

    /// Assigns a roster role to a player.
    ///
    /// # Errors
    ///
    /// Returns `WorldNotFound`, `WrongPhase`, `NotRegistered`,
    /// `RoleAlreadyChosen`, or `RoleUnavailable` when the role is taken or not
    /// on the roster.
    pub fn assign_role(
        &mut self,
        player_id: &str,
        role: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<RoleAssignment, SessionError> {
        let world_id = self.ensure_identity(None)?;
        if self.phase != Phase::RoleSelection {
            return Err(SessionError::WrongPhase(self.phase));
        }

        let player = self
            .player(player_id)
            .ok_or_else(|| SessionError::NotRegistered(player_id.to_owned()))?;
        if let Some(held) = &player.role {
            return Err(SessionError::RoleAlreadyChosen(held.clone()));
        }

        let requested = role.trim().to_lowercase();
        let canonical = self
            .roster
            .iter()
            .find(|r| r.to_lowercase() == requested)
            .cloned()
            .ok_or_else(|| SessionError::RoleUnavailable(role.trim().to_owned()))?;
        if self.roles_taken.contains(&canonical) {
            return Err(SessionError::RoleUnavailable(canonical));
        }

        self.record(
            WorldEventKind::RoleAssigned(RoleAssigned {
                world_id,
                player_id: player_id.to_owned(),
                role: canonical.clone(),
            }),
            correlation_id,
            clock,
        );

        Ok(RoleAssignment {
            player_id: player_id.to_owned(),
            role: canonical,
            roster_complete: self.all_roles_assigned(),
        })
    }

    /// Starts round 1 with the opening narration once every player has a
    /// role.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` outside `ROLE_SELECTION`, or
    /// `DomainError::Validation` if a player still lacks a role.
    pub fn start_game(
        &mut self,
        narration: RoundNarration,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), SessionError> {
        let world_id = self.ensure_identity(None)?;
        self.phase.transition(Phase::Running)?;
        if !self.all_roles_assigned() {
            return Err(DomainError::Validation("not every player has a role".into()).into());
        }

        self.record(
            WorldEventKind::GameStarted(GameStarted {
                world_id,
                round: 1,
                narration: narration.text,
                fallback: narration.fallback,
            }),
            correlation_id,
            clock,
        );
        self.conclude_if(narration.concluded, 1, correlation_id, clock)
    }

    /// Records a player's choice for the current round.
    ///
    /// # Errors
    ///
    /// Returns `WorldNotFound`, `WrongPhase` outside `RUNNING`,
    /// `InvalidChoice`, `NotRegistered` or `DuplicateSubmission`.
    pub fn submit_choice(
        &mut self,
        player_id: &str,
        raw_choice: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<SubmittedChoice, SessionError> {
        let world_id = self.ensure_identity(None)?;
        if self.phase != Phase::Running {
            return Err(SessionError::WrongPhase(self.phase));
        }
        let choice: Choice = raw_choice.parse()?;

        let character_name = self
            .player(player_id)
            .map(|p| p.character_name.clone())
            .ok_or_else(|| SessionError::NotRegistered(player_id.to_owned()))?;
        if self.round_choices.contains_key(&character_name) {
            return Err(SessionError::DuplicateSubmission(self.current_round));
        }

        let round = self.current_round;
        self.record(
            WorldEventKind::ChoiceSubmitted(ChoiceSubmitted {
                world_id,
                round,
                character_name: character_name.clone(),
                choice,
            }),
            correlation_id,
            clock,
        );

        Ok(SubmittedChoice {
            round,
            character_name,
            choice,
            round_complete: self.round_complete(),
        })
    }

    /// Closes the current round with its narration and clears the
    /// submissions. Concludes the game if the narration says so.
    ///
    /// Returns the round that was completed.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` outside `RUNNING`, or `DomainError::Validation`
    /// if a player has not submitted yet.
    pub fn advance_round(
        &mut self,
        narration: RoundNarration,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<u32, SessionError> {
        let world_id = self.ensure_identity(None)?;
        self.phase.transition(Phase::Running)?;
        if !self.round_complete() {
            return Err(DomainError::Validation("round is not complete".into()).into());
        }

        let completed_round = self.current_round;
        self.record(
            WorldEventKind::RoundAdvanced(RoundAdvanced {
                world_id,
                completed_round,
                choices: self.round_choices.clone(),
                narration: narration.text,
                fallback: narration.fallback,
            }),
            correlation_id,
            clock,
        );
        self.conclude_if(narration.concluded, completed_round, correlation_id, clock)?;
        Ok(completed_round)
    }

    /// Discards the current World (if any) and opens a fresh one in `SETUP`.
    /// Returns the new World identity.
    pub fn reset(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Uuid {
        let world_id = Uuid::new_v4();
        self.record(
            WorldEventKind::WorldReset(WorldReset {
                previous_world_id: self.world_id,
                world_id,
            }),
            correlation_id,
            clock,
        );
        world_id
    }

    /// Narration request for the opening of round 1.
    #[must_use]
    pub fn opening_request(&self) -> NarrationRequest {
        self.narration_request(1, BTreeMap::new())
    }

    /// Narration request for the current round's submissions.
    #[must_use]
    pub fn round_request(&self) -> NarrationRequest {
        let choices = self
            .round_choices
            .iter()
            .map(|(name, choice)| (name.clone(), choice.label().to_owned()))
            .collect();
        self.narration_request(self.current_round, choices)
    }

    /// Every registered player has a role.
    #[must_use]
    pub fn all_roles_assigned(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.role.is_some())
    }

    /// Every registered player has submitted for the current round.
    #[must_use]
    pub fn round_complete(&self) -> bool {
        !self.players.is_empty()
            && self
                .players
                .iter()
                .all(|p| self.round_choices.contains_key(&p.character_name))
    }

    /// Folds uncommitted events into the persisted version after a
    /// successful append.
    pub fn mark_committed(&mut self) {
        #[allow(clippy::cast_possible_wrap)]
        let committed = self.uncommitted_events.len() as i64;
        self.version += committed;
        self.uncommitted_events.clear();
    }

    fn narration_request(&self, round: u32, choices: BTreeMap<String, String>) -> NarrationRequest {
        NarrationRequest {
            lore: self.lore.clone(),
            rules: self.rules.clone(),
            world_state: self.world_state.clone(),
            round,
            choices,
            cast: self
                .players
                .iter()
                .filter_map(|p| {
                    p.role.as_ref().map(|role| CastMember {
                        character_name: p.character_name.clone(),
                        role: role.clone(),
                    })
                })
                .collect(),
        }
    }

    fn ensure_setup_open(&self) -> Result<(), SessionError> {
        if self.world_id.is_some() && !self.phase.accepts_setup() {
            return Err(SessionError::AlreadyInitialized(self.phase));
        }
        Ok(())
    }

    fn open_if_absent(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Uuid {
        if let Some(world_id) = self.world_id {
            return world_id;
        }
        let world_id = Uuid::new_v4();
        self.record(
            WorldEventKind::WorldOpened(WorldOpened { world_id }),
            correlation_id,
            clock,
        );
        world_id
    }

    fn conclude_if(
        &mut self,
        concluded: bool,
        final_round: u32,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), SessionError> {
        if !concluded {
            return Ok(());
        }
        let world_id = self.ensure_identity(None)?;
        self.phase.transition(Phase::Completed)?;
        self.record(
            WorldEventKind::GameConcluded(GameConcluded {
                world_id,
                final_round,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Stamps a new event, folds it into state and queues it for the next
    /// append.
    fn record(&mut self, kind: WorldEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = WorldEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.mutate(&event.kind);
        self.uncommitted_events.push(event);
    }

    /// Replaces all World state with an empty `SETUP` World.
    fn discard_world(&mut self, world_id: Uuid) {
        *self = Self {
            id: self.id,
            version: self.version,
            world_id: Some(world_id),
            uncommitted_events: std::mem::take(&mut self.uncommitted_events),
            ..Self::new(self.id)
        };
    }

    fn mutate(&mut self, kind: &WorldEventKind) {
        match kind {
            WorldEventKind::WorldOpened(payload) => self.discard_world(payload.world_id),
            WorldEventKind::WorldReset(payload) => self.discard_world(payload.world_id),
            WorldEventKind::SetupCompleted(payload) => {
                self.roster.clone_from(&payload.roster);
                self.capacity = payload.capacity;
                self.lore.clone_from(&payload.lore);
                self.rules.clone_from(&payload.rules);
                self.phase = Phase::AwaitingPlayers;
            }
            WorldEventKind::SetupFailed(_) => self.phase = Phase::FailedSetup,
            WorldEventKind::PlayerRegistered(payload) => self.players.push(Player {
                player_id: payload.player_id.clone(),
                display_name: payload.display_name.clone(),
                character_name: payload.character_name.clone(),
                role: None,
            }),
            WorldEventKind::RoleSelectionOpened(_) => self.phase = Phase::RoleSelection,
            WorldEventKind::RoleAssigned(payload) => {
                if let Some(player) = self
                    .players
                    .iter_mut()
                    .find(|p| p.player_id == payload.player_id)
                {
                    player.role = Some(payload.role.clone());
                }
                self.roles_taken.insert(payload.role.clone());
            }
            WorldEventKind::GameStarted(payload) => {
                self.phase = Phase::Running;
                self.current_round = payload.round;
                self.world_state.clone_from(&payload.narration);
            }
            WorldEventKind::ChoiceSubmitted(payload) => {
                self.round_choices
                    .insert(payload.character_name.clone(), payload.choice);
            }
            WorldEventKind::RoundAdvanced(payload) => {
                self.current_round = payload.completed_round + 1;
                self.round_choices.clear();
                self.world_state.clone_from(&payload.narration);
            }
            WorldEventKind::GameConcluded(_) => self.phase = Phase::Completed,
        }
    }
}

fn non_blank(value: &str, field: &str) -> Result<String, SessionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SessionError::IncompleteSetup(format!("{field} is empty")));
    }
    Ok(trimmed.to_owned())
}

impl AggregateRoot for World {
    type Event = WorldEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        self.mutate(&event.kind);
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
