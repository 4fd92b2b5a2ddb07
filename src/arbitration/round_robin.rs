//! Turn order for round-robin play.

use crate::models::participant::Participant;

/// Ordered roster and whose turn it is.
///
/// `current` is always a valid index into `roster` unless the roster is
/// empty, in which case no one may play.
#[derive(Debug, Default, Clone)]
pub struct TurnState {
    roster: Vec<Participant>,
    current: usize,
}

impl TurnState {
    /// Roster containing a single player.
    #[must_use]
    pub fn with_player(player: Participant) -> Self {
        Self {
            roster: vec![player],
            current: 0,
        }
    }

    /// Add a player to the end of the rotation. Returns `false` if already present.
    pub fn join(&mut self, player: Participant) -> bool {
        if self.contains(&player.id) {
            return false;
        }
        self.roster.push(player);
        true
    }

    /// Remove a player. Returns `false` if they were not in the rotation.
    ///
    /// Removing the current player hands the turn to the next one in order.
    pub fn leave(&mut self, player_id: &str) -> bool {
        let Some(index) = self.roster.iter().position(|p| p.id == player_id) else {
            return false;
        };
        self.roster.remove(index);
        if index < self.current {
            self.current -= 1;
        }
        if self.current >= self.roster.len() {
            self.current = 0;
        }
        true
    }

    /// Whether `player_id` is in the rotation.
    #[must_use]
    pub fn contains(&self, player_id: &str) -> bool {
        self.roster.iter().any(|p| p.id == player_id)
    }

    /// Player whose turn it is.
    #[must_use]
    pub fn current(&self) -> Option<&Participant> {
        self.roster.get(self.current)
    }

    /// Index of the player whose turn it is.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Whether it is `player_id`'s turn.
    #[must_use]
    pub fn is_turn(&self, player_id: &str) -> bool {
        self.current().is_some_and(|p| p.id == player_id)
    }

    /// Move to the next player, wrapping after the last.
    pub fn advance(&mut self) -> Option<&Participant> {
        if self.roster.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.roster.len();
        self.roster.get(self.current)
    }

    /// Players in turn order.
    #[must_use]
    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// Number of players in the rotation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    /// Whether the rotation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }
}
