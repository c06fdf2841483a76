//! Shared test doubles for the Loreweave session engine.

mod clock;
mod narrator;
mod repository;

pub use clock::FixedClock;
pub use narrator::{FailingNarrator, StalledNarrator, StaticNarrator};
pub use repository::{
    ConflictingEventRepository, EmptyEventRepository, FailingEventRepository,
    InterleavingEventRepository, RecordingEventRepository,
};
