//! Chat-facing command layer: parsing bot commands and routing them to
//! sessions.

pub mod commands;
pub mod dispatcher;

pub use commands::ChatCommand;
pub use dispatcher::Dispatcher;
