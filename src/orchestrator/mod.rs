//! Session orchestration.
//!
//! Covers the interpreter process supervisor and its output drain, the
//! per-channel session actor and the registry of live sessions.

pub mod drain;
pub mod registry;
pub mod session;
pub mod supervisor;

pub use drain::DrainEvent;
pub use registry::SessionRegistry;
pub use session::{spawn_session, SessionCommand, SessionHandle, SessionRequest};
pub use supervisor::Supervisor;
