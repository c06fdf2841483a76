//! Application services for the World session context.

pub mod command_handlers;
pub mod narration;
pub mod query_handlers;
