//! Chat participants.

use serde::{Deserialize, Serialize};

/// A chat user taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Stable user identifier assigned by the chat platform.
    pub id: String,
    /// Display name used in notices.
    pub name: String,
}

impl Participant {
    /// Construct a participant.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
