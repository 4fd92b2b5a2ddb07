#![forbid(unsafe_code)]

//! Session engine for playing text adventures in chat channels.
//!
//! Each channel runs its own interpreter process. Output is cut into
//! messages by silence, composed to fit the chat's limits and posted with
//! any new save file attached. Input from several players is arbitrated by
//! a per-session policy.

pub mod arbitration;
pub mod chat;
pub mod config;
pub mod errors;
pub mod messaging;
pub mod models;
pub mod orchestrator;
pub mod saves;
pub mod story;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
