//! Loreweave Core — shared domain abstractions.
//!
//! Traits and types every bounded context depends on: aggregates, events,
//! the event repository seam, the clock, and the narration collaborator.
//! It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod narration;
pub mod repository;
