//! Test narrators — `Narrator` doubles for the narration pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use loreweave_core::narration::{Narration, NarrationError, NarrationRequest, Narrator};

/// Answers every request with the same text and counts calls.
#[derive(Debug)]
pub struct StaticNarrator {
    narration: Narration,
    calls: AtomicUsize,
}

impl StaticNarrator {
    /// A narrator that keeps the story going with `text`.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            narration: Narration::continuing(text),
            calls: AtomicUsize::new(0),
        }
    }

    /// A narrator that ends the story with `text`.
    #[must_use]
    pub fn concluding(text: &str) -> Self {
        Self {
            narration: Narration {
                text: text.to_owned(),
                concluded: true,
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `narrate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Narrator for StaticNarrator {
    async fn narrate(&self, _request: &NarrationRequest) -> Result<Narration, NarrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.narration.clone())
    }
}

/// A narrator that always errors.
#[derive(Debug)]
pub struct FailingNarrator;

#[async_trait]
impl Narrator for FailingNarrator {
    async fn narrate(&self, _request: &NarrationRequest) -> Result<Narration, NarrationError> {
        Err(NarrationError::Unavailable("model overloaded".into()))
    }
}

/// A narrator that never answers. Exercises the caller's timeout.
#[derive(Debug)]
pub struct StalledNarrator;

#[async_trait]
impl Narrator for StalledNarrator {
    async fn narrate(&self, _request: &NarrationRequest) -> Result<Narration, NarrationError> {
        std::future::pending().await
    }
}
