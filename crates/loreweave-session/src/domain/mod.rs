//! Domain model for the World session context.

pub mod aggregates;
pub mod choice;
pub mod commands;
pub mod errors;
pub mod events;
pub mod phase;
pub mod roster;
