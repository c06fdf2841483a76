//! Test repositories — mock `EventRepository` implementations for tests.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use loreweave_core::error::DomainError;
use loreweave_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// An event repository that returns a fixed stream from every `load_events`
/// call and records every `append_events` call without applying it.
#[derive(Debug)]
pub struct RecordingEventRepository {
    stream: Vec<StoredEvent>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Create a repository whose loads always return `stream`.
    #[must_use]
    pub fn new(stream: Vec<StoredEvent>) -> Self {
        Self {
            stream,
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all `(aggregate_id, expected_version, events)`
    /// appends.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.stream.clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository that always returns an empty event list and silently
/// accepts appends. Useful for "world not found" scenarios.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// An event repository whose stream never changes but whose appends always
/// lose the version race. Counts append attempts so retry bounds can be
/// asserted.
#[derive(Debug)]
pub struct ConflictingEventRepository {
    stream: Vec<StoredEvent>,
    attempts: AtomicUsize,
}

impl ConflictingEventRepository {
    /// Create a repository whose loads always return `stream`.
    #[must_use]
    pub fn new(stream: Vec<StoredEvent>) -> Self {
        Self {
            stream,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of `append_events` calls so far.
    pub fn append_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventRepository for ConflictingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.stream.clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: expected_version,
            actual: expected_version + 1,
        })
    }
}

/// Wraps a real repository and, just before the first append reaches it,
/// commits another writer's events to the same stream. That first append then
/// loses the version race, and the command's retry sees the other writer's
/// stream.
pub struct InterleavingEventRepository {
    inner: Arc<dyn EventRepository>,
    interleaved: Mutex<Option<Vec<StoredEvent>>>,
}

impl InterleavingEventRepository {
    /// Create a repository that slips `interleaved` in ahead of the first
    /// append to `inner`. The events must continue the stream as it stands
    /// when that append happens.
    #[must_use]
    pub fn new(inner: Arc<dyn EventRepository>, interleaved: Vec<StoredEvent>) -> Self {
        Self {
            inner,
            interleaved: Mutex::new(Some(interleaved)),
        }
    }
}

impl fmt::Debug for InterleavingEventRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterleavingEventRepository")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventRepository for InterleavingEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.load_events(aggregate_id).await
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let pending = self.interleaved.lock().unwrap().take();
        if let Some(other_writer) = pending {
            self.inner
                .append_events(aggregate_id, expected_version, &other_writer)
                .await?;
        }
        self.inner
            .append_events(aggregate_id, expected_version, events)
            .await
    }
}
