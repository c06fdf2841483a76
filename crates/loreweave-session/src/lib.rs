//! Loreweave — World session context.
//!
//! Responsible for the life of one shared story: setup, player
//! registration, role assignment, and the round barrier that gates
//! narrative advancement.

pub mod application;
pub mod domain;
