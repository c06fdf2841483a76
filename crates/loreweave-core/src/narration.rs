//! Narration collaborator abstraction.
//!
//! Narrative text is produced by an external text-generation service. The
//! core only sees this trait; timeouts and fallbacks are applied by the
//! caller, so implementations are free to be slow or to fail.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A character taking part in the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastMember {
    /// The character's in-world name.
    pub character_name: String,
    /// The roster role the character plays.
    pub role: String,
}

/// Everything the narrator needs to move the story forward one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationRequest {
    /// Immutable world lore fixed during setup.
    pub lore: String,
    /// Immutable rules text fixed during setup.
    pub rules: String,
    /// Narrative state the round started from.
    pub world_state: String,
    /// The round being narrated. Round 1 is the opening.
    pub round: u32,
    /// Character name to choice label. Empty for the opening round.
    pub choices: BTreeMap<String, String>,
    /// The characters in play.
    pub cast: Vec<CastMember>,
}

impl NarrationRequest {
    /// Returns `true` when this request asks for the opening narration.
    #[must_use]
    pub fn is_opening(&self) -> bool {
        self.choices.is_empty()
    }
}

/// Narrative text produced for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narration {
    /// The new world state text.
    pub text: String,
    /// Set when the narrator decides the story has ended.
    #[serde(default)]
    pub concluded: bool,
}

impl Narration {
    /// Narration that keeps the story going.
    #[must_use]
    pub fn continuing(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            concluded: false,
        }
    }
}

/// Why the narrator could not produce text.
#[derive(Debug, Error)]
pub enum NarrationError {
    /// The narrator could not be reached or returned an error.
    #[error("narrator unavailable: {0}")]
    Unavailable(String),

    /// The narrator did not answer within the allotted time.
    #[error("narrator timed out after {0} ms")]
    Timeout(u128),

    /// The narrator answered with no text.
    #[error("narrator returned empty text")]
    Empty,
}

/// External text-generation collaborator.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Produce the narration for one round.
    async fn narrate(&self, request: &NarrationRequest) -> Result<Narration, NarrationError>;
}
