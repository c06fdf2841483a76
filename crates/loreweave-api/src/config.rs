//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use loreweave_session::application::narration::DEFAULT_NARRATION_TIMEOUT;

use crate::error::AppError;

/// Runtime configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind.
    pub addr: SocketAddr,
    /// PostgreSQL URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// HTTP narrator endpoint; `None` means fallback narration only.
    pub narrator_url: Option<String>,
    /// Upper bound on a single narrator call.
    pub narration_timeout: Duration,
    /// Token required on admin routes, if set.
    pub admin_token: Option<String>,
    /// OTLP collector endpoint for span export, if set.
    pub otlp_endpoint: Option<String>,
}

impl ApiConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, treating blank values as unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = match var("PORT") {
            Some(port) => port
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => 3000,
        };
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;

        let narration_timeout = match var("NARRATION_TIMEOUT_MS") {
            Some(ms) => {
                let ms: u64 = ms.parse().map_err(|e| {
                    AppError::Config(format!("NARRATION_TIMEOUT_MS must be a number: {e}"))
                })?;
                if ms == 0 {
                    return Err(AppError::Config(
                        "NARRATION_TIMEOUT_MS must be greater than zero".into(),
                    ));
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_NARRATION_TIMEOUT,
        };

        Ok(Self {
            addr,
            database_url: var("DATABASE_URL"),
            narrator_url: var("NARRATOR_URL"),
            narration_timeout,
            admin_token: var("ADMIN_TOKEN"),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }
}
