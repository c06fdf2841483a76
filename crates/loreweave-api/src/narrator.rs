//! HTTP narrator: delegates round narration to an external text service.

use std::time::Duration;

use async_trait::async_trait;
use loreweave_core::narration::{Narration, NarrationError, NarrationRequest, Narrator};

use crate::error::AppError;

/// Narrator that POSTs each [`NarrationRequest`] as JSON and expects a
/// `{ "text": ..., "concluded": ... }` body back.
#[derive(Debug, Clone)]
pub struct HttpNarrator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNarrator {
    /// Creates a narrator for `endpoint`. `timeout` bounds the whole HTTP
    /// exchange; the narration service applies its own timeout on top.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build narrator client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// The configured endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Narrator for HttpNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<Narration, NarrationError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| NarrationError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(NarrationError::Unavailable(format!(
                "narrator returned {status}: {message}"
            )));
        }

        resp.json::<Narration>()
            .await
            .map_err(|e| NarrationError::Unavailable(format!("invalid narrator response: {e}")))
    }
}
