//! Narration service: bounded calls to the narrator with a deterministic
//! fallback.
//!
//! The round barrier never waits on the narrator for longer than the
//! configured timeout, and a failed call never stalls the game.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use loreweave_core::narration::{Narration, NarrationError, NarrationRequest, Narrator};
use tracing::{debug, warn};

use crate::domain::aggregates::RoundNarration;

/// Timeout applied when none is configured.
pub const DEFAULT_NARRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps an optional [`Narrator`] with a timeout and fallback text.
#[derive(Clone)]
pub struct NarrationService {
    narrator: Option<Arc<dyn Narrator>>,
    timeout: Duration,
}

impl fmt::Debug for NarrationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationService")
            .field("narrator_configured", &self.narrator.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NarrationService {
    /// Creates a service calling `narrator` with the given timeout.
    #[must_use]
    pub fn new(narrator: Arc<dyn Narrator>, timeout: Duration) -> Self {
        Self {
            narrator: Some(narrator),
            timeout,
        }
    }

    /// Creates a service with no narrator; every round gets fallback text.
    #[must_use]
    pub fn fallback_only() -> Self {
        Self {
            narrator: None,
            timeout: DEFAULT_NARRATION_TIMEOUT,
        }
    }

    /// The timeout applied to each narrator call.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Produces narration for `request`. Never fails: timeouts, errors and
    /// blank text are replaced with [`fallback_narration`].
    pub async fn narrate(&self, request: &NarrationRequest) -> RoundNarration {
        let Some(narrator) = &self.narrator else {
            debug!(round = request.round, "no narrator configured, using fallback");
            return fallback(request);
        };

        match self.call(narrator.as_ref(), request).await {
            Ok(narration) => RoundNarration {
                text: narration.text,
                concluded: narration.concluded,
                fallback: false,
            },
            Err(err) => {
                warn!(round = request.round, error = %err, "narration failed, using fallback");
                fallback(request)
            }
        }
    }

    async fn call(
        &self,
        narrator: &dyn Narrator,
        request: &NarrationRequest,
    ) -> Result<Narration, NarrationError> {
        let narration = tokio::time::timeout(self.timeout, narrator.narrate(request))
            .await
            .map_err(|_| NarrationError::Timeout(self.timeout.as_millis()))??;

        if narration.text.trim().is_empty() {
            return Err(NarrationError::Empty);
        }
        Ok(narration)
    }
}

fn fallback(request: &NarrationRequest) -> RoundNarration {
    RoundNarration {
        text: fallback_narration(request),
        concluded: false,
        fallback: true,
    }
}

/// Deterministic narration used when the narrator cannot answer.
///
/// The opening names the cast; later rounds restate every submission in
/// character-name order, so no choice is lost from the story.
#[must_use]
pub fn fallback_narration(request: &NarrationRequest) -> String {
    if request.is_opening() {
        let cast: Vec<String> = request
            .cast
            .iter()
            .map(|member| format!("{} the {}", member.character_name, member.role))
            .collect();
        if cast.is_empty() {
            return format!("Round {} begins.", request.round);
        }
        return format!(
            "Round {} begins. {} step into the story.",
            request.round,
            join_names(&cast)
        );
    }

    let mut text = format!("Round {} ends.", request.round);
    for (character_name, label) in &request.choices {
        text.push_str(&format!(" {character_name} chose {label}."));
    }
    text
}

fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
