//! Loreweave event stores.
//!
//! Both implementations enforce the same compare-and-append contract:
//! an append only succeeds when the stream is still at the expected version.

pub mod memory_event_repository;
pub mod pg_event_repository;

/// Schema migrations for the PostgreSQL store.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
