//! Shared application state.

use std::sync::Arc;

use loreweave_core::clock::Clock;
use loreweave_core::repository::EventRepository;
use loreweave_session::application::narration::NarrationService;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for event timestamps.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// Session stream store.
    pub event_repository: Arc<dyn EventRepository>,
    /// Narrator wrapped with timeout and fallback.
    pub narration: Arc<NarrationService>,
    /// Token admin routes require, if configured.
    pub admin_token: Option<Arc<str>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("narration", &self.narration)
            .field("admin_token_configured", &self.admin_token.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock + Send + Sync>,
        event_repository: Arc<dyn EventRepository>,
        narration: NarrationService,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            clock,
            event_repository,
            narration: Arc::new(narration),
            admin_token: admin_token.map(Arc::from),
        }
    }
}
