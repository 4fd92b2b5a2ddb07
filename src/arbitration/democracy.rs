//! Vote tally for democracy rounds.

use std::collections::{HashMap, HashSet};

use tokio::time::Instant;

/// Outcome of closing a voting round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One action had strictly the most votes.
    Winner {
        /// Canonical action token.
        action: String,
        /// Number of votes it received.
        votes: usize,
    },
    /// Two or more actions shared the highest count; the round is discarded.
    Draw(Vec<String>),
    /// Nobody voted.
    Empty,
}

/// Votes cast in the current round, keyed by canonical action.
///
/// A voter appears in at most one action's set.
#[derive(Debug, Default, Clone)]
pub struct VoteTally {
    votes: HashMap<String, HashSet<String>>,
}

impl VoteTally {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `voter` already voted this round.
    #[must_use]
    pub fn has_voted(&self, voter: &str) -> bool {
        self.votes.values().any(|voters| voters.contains(voter))
    }

    /// Record a vote. Returns `false` (and changes nothing) if the voter
    /// already voted this round.
    pub fn cast(&mut self, voter: &str, action: &str) -> bool {
        if self.has_voted(voter) {
            return false;
        }
        self.votes
            .entry(action.to_owned())
            .or_default()
            .insert(voter.to_owned());
        true
    }

    /// Votes currently recorded for `action`.
    #[must_use]
    pub fn count(&self, action: &str) -> usize {
        self.votes.get(action).map_or(0, HashSet::len)
    }

    /// Whether no votes have been cast.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Number of distinct actions voted for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    /// Close the round: report the outcome and clear the tally.
    pub fn resolve(&mut self) -> Resolution {
        let votes = std::mem::take(&mut self.votes);
        let Some(highest) = votes.values().map(HashSet::len).max() else {
            return Resolution::Empty;
        };

        let mut leaders: Vec<String> = votes
            .into_iter()
            .filter(|(_, voters)| voters.len() == highest)
            .map(|(action, _)| action)
            .collect();

        if leaders.len() > 1 {
            leaders.sort();
            return Resolution::Draw(leaders);
        }

        match leaders.pop() {
            Some(action) => Resolution::Winner {
                action,
                votes: highest,
            },
            None => Resolution::Empty,
        }
    }

    /// Discard all votes.
    pub fn clear(&mut self) {
        self.votes.clear();
    }
}

/// Timer state of an open voting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VotingRound {
    pub(crate) started: Instant,
    pub(crate) warned: bool,
}

impl VotingRound {
    pub(crate) fn open(now: Instant) -> Self {
        Self {
            started: now,
            warned: false,
        }
    }
}
