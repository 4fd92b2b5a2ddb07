//! Domain models shared across the application.

pub mod participant;
pub mod program;

pub use participant::Participant;
pub use program::{Catalog, Lookup, Program};
