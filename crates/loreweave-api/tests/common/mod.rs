//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use loreweave_core::clock::Clock;
use loreweave_core::repository::EventRepository;
use loreweave_event_store::memory_event_repository::InMemoryEventRepository;
use loreweave_event_store::pg_event_repository::PgEventRepository;
use loreweave_session::application::narration::NarrationService;
use loreweave_test_support::FixedClock;
use sqlx::PgPool;
use tower::ServiceExt;

use loreweave_api::build_router;
use loreweave_api::routes::session::ADMIN_TOKEN_HEADER;
use loreweave_api::state::AppState;

/// Admin token configured on apps built by [`build_admin_app`].
pub const ADMIN_TOKEN: &str = "test-admin-token";

fn fixed_clock() -> Arc<dyn Clock + Send + Sync> {
    Arc::new(FixedClock::default_instant())
}

fn app_with(event_repository: Arc<dyn EventRepository>, admin_token: Option<&str>) -> Router {
    build_router(AppState::new(
        fixed_clock(),
        event_repository,
        NarrationService::fallback_only(),
        admin_token.map(str::to_owned),
    ))
}

/// Build the full app over a shared in-memory store with fallback narration
/// and open admin routes.
pub fn build_test_app(repo: Arc<InMemoryEventRepository>) -> Router {
    app_with(repo, None)
}

/// Like [`build_test_app`] but admin routes require [`ADMIN_TOKEN`].
pub fn build_admin_app(repo: Arc<InMemoryEventRepository>) -> Router {
    app_with(repo, Some(ADMIN_TOKEN))
}

/// Build the full app over a real `PgEventRepository`.
pub fn build_pg_app(pool: PgPool) -> Router {
    app_with(Arc::new(PgEventRepository::new(pool)), None)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

fn json_request(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = json_request(uri)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Send a POST request carrying the admin token header.
pub async fn post_json_as_admin(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = json_request(uri)
        .header(ADMIN_TOKEN_HEADER, ADMIN_TOKEN)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}
