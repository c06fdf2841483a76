//! Commands for the World session context.
//!
//! Every command targets the session stream of one session key. Commands that
//! act on behalf of a player may also name the World they expect; if that
//! World has been reset in the meantime the command fails instead of writing
//! into the fresh one.

use loreweave_core::command::Command;
use uuid::Uuid;

/// Command to create an empty World in `SETUP`.
#[derive(Debug, Clone)]
pub struct OpenWorld {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session stream.
    pub session_id: Uuid,
}

impl Command for OpenWorld {
    fn command_type(&self) -> &'static str {
        "session.open_world"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn stream_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to fix the roster and narrative configuration and open
/// registration.
#[derive(Debug, Clone)]
pub struct InitializeWorld {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session stream.
    pub session_id: Uuid,
    /// Role names available to players.
    pub roster: Vec<String>,
    /// Maximum number of players.
    pub capacity: usize,
    /// World lore.
    pub lore: String,
    /// Rules text.
    pub rules: String,
}

impl Command for InitializeWorld {
    fn command_type(&self) -> &'static str {
        "session.initialize_world"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn stream_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to run setup with the roster extracted from a numbered role
/// prompt.
#[derive(Debug, Clone)]
pub struct InitializeFromRolePrompt {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session stream.
    pub session_id: Uuid,
    /// Free text listing roles as `1. NAME (NOTE)` lines.
    pub role_prompt: String,
    /// Maximum number of players.
    pub capacity: usize,
    /// World lore.
    pub lore: String,
    /// Rules text.
    pub rules: String,
}

impl Command for InitializeFromRolePrompt {
    fn command_type(&self) -> &'static str {
        "session.initialize_from_role_prompt"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn stream_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to register a player.
#[derive(Debug, Clone)]
pub struct RegisterPlayer {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session stream.
    pub session_id: Uuid,
    /// The World the caller expects, if known.
    pub world_id: Option<Uuid>,
    /// External player identity.
    pub player_id: String,
    /// Requested character name.
    pub character_name: String,
    /// Chat platform handle.
    pub display_name: String,
}

impl Command for RegisterPlayer {
    fn command_type(&self) -> &'static str {
        "session.register_player"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn stream_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to assign a role to a player.
#[derive(Debug, Clone)]
pub struct AssignRole {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session stream.
    pub session_id: Uuid,
    /// The World the caller expects, if known.
    pub world_id: Option<Uuid>,
    /// The player picking a role.
    pub player_id: String,
    /// Requested role name.
    pub role: String,
}

impl Command for AssignRole {
    fn command_type(&self) -> &'static str {
        "session.assign_role"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn stream_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to submit a player's choice for the current round.
#[derive(Debug, Clone)]
pub struct SubmitChoice {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session stream.
    pub session_id: Uuid,
    /// The World the caller expects, if known.
    pub world_id: Option<Uuid>,
    /// The submitting player.
    pub player_id: String,
    /// Raw choice input; validated against the choice alphabet.
    pub choice: String,
}

impl Command for SubmitChoice {
    fn command_type(&self) -> &'static str {
        "session.submit_choice"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn stream_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to discard the World and start over with a fresh one.
#[derive(Debug, Clone)]
pub struct ResetWorld {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session stream.
    pub session_id: Uuid,
}

impl Command for ResetWorld {
    fn command_type(&self) -> &'static str {
        "session.reset_world"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn stream_id(&self) -> Uuid {
        self.session_id
    }
}
