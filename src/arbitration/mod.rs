//! Multi-player input arbitration.
//!
//! Decides, for each chat message aimed at the game, whether, when and what
//! to forward to the interpreter. Four policies exist:
//!
//! | Mode          | Who is forwarded                                      |
//! |---------------|-------------------------------------------------------|
//! | `Anarchy`     | Everyone, immediately                                 |
//! | `Driver`      | Only the current driver                               |
//! | `Democracy`   | The most-voted action of a timed round, if unique     |
//! | `RoundRobin`  | Only the player whose turn it is; idle turns skipped  |
//!
//! [`Arbiter`] performs no I/O and owns no timers. It records deadlines and
//! the session task sleeps until [`Arbiter::next_deadline`], then calls
//! [`Arbiter::on_deadline`]. Every operation returns the [`Effect`]s the
//! session must carry out, in order.

pub mod action;
pub mod democracy;
pub mod round_robin;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use crate::models::participant::Participant;
use crate::{AppError, Result};

use democracy::{Resolution, VoteTally, VotingRound};
use round_robin::TurnState;

/// Input arbitration policy for a session.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Anyone may send any command at any time.
    #[default]
    Anarchy,
    /// Players vote; the top action of each round is sent.
    Democracy,
    /// Only the driver may send commands.
    Driver,
    /// Players take turns in a fixed order.
    RoundRobin,
}

impl Display for InputMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Anarchy => "anarchy",
            Self::Democracy => "democracy",
            Self::Driver => "driver",
            Self::RoundRobin => "round robin",
        };
        f.write_str(name)
    }
}

impl FromStr for InputMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "anarchy" => Ok(Self::Anarchy),
            "democracy" => Ok(Self::Democracy),
            "driver" => Ok(Self::Driver),
            "roundrobin" => Ok(Self::RoundRobin),
            other => Err(AppError::InvalidMode(format!("unknown input mode: {other}"))),
        }
    }
}

/// Something the session must do as a result of arbitration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write this input to the interpreter.
    Forward(String),
    /// Post this notice to the channel.
    Notice(String),
}

/// Timer lengths used by the democracy and round-robin policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbitrationTimings {
    /// Total length of a voting round, measured from its first vote.
    pub democracy_window: Duration,
    /// Point in the round at which the "time remaining" notice is posted.
    pub democracy_warning: Duration,
    /// How long a round-robin player may idle before being skipped.
    pub round_robin_skip: Duration,
}

impl Default for ArbitrationTimings {
    fn default() -> Self {
        Self {
            democracy_window: Duration::from_secs(15),
            democracy_warning: Duration::from_secs(10),
            round_robin_skip: Duration::from_secs(5),
        }
    }
}

/// Input arbitration state machine for one session.
#[derive(Debug)]
pub struct Arbiter {
    mode: InputMode,
    driver: Participant,
    tally: VoteTally,
    round: Option<VotingRound>,
    turns: TurnState,
    skip_at: Option<Instant>,
    timings: ArbitrationTimings,
}

impl Arbiter {
    /// New arbiter in anarchy mode. The owner starts as driver and as the
    /// first player of the round-robin rotation.
    #[must_use]
    pub fn new(owner: Participant, timings: ArbitrationTimings) -> Self {
        Self {
            mode: InputMode::Anarchy,
            turns: TurnState::with_player(owner.clone()),
            driver: owner,
            tally: VoteTally::new(),
            round: None,
            skip_at: None,
            timings,
        }
    }

    /// Current policy.
    #[must_use]
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Current driver.
    #[must_use]
    pub fn driver(&self) -> &Participant {
        &self.driver
    }

    /// Votes of the open round.
    #[must_use]
    pub fn tally(&self) -> &VoteTally {
        &self.tally
    }

    /// Round-robin rotation.
    #[must_use]
    pub fn turns(&self) -> &TurnState {
        &self.turns
    }

    /// Handle one message from a player.
    pub fn submit(&mut self, from: &Participant, text: &str, now: Instant) -> Vec<Effect> {
        match self.mode {
            InputMode::Anarchy => vec![Effect::Forward(text.to_owned())],
            InputMode::Driver => {
                if from.id == self.driver.id {
                    vec![Effect::Forward(text.to_owned())]
                } else {
                    debug!(player = %from.id, "ignoring input from non-driver");
                    Vec::new()
                }
            }
            InputMode::Democracy => self.vote(from, text, now),
            InputMode::RoundRobin => {
                if !self.turns.is_turn(&from.id) {
                    debug!(player = %from.id, "ignoring out-of-turn input");
                    return Vec::new();
                }
                let mut effects = vec![Effect::Forward(text.to_owned())];
                self.advance_turn(now, &mut effects);
                effects
            }
        }
    }

    /// Switch policy. Pending votes and timers are discarded.
    pub fn set_mode(&mut self, mode: InputMode, now: Instant) -> Vec<Effect> {
        self.cancel_timers();
        self.mode = mode;

        let mut effects = vec![Effect::Notice(format!("Input mode is now {mode}."))];
        if mode == InputMode::RoundRobin {
            if let Some(player) = self.turns.current() {
                effects.push(Effect::Notice(format!("It is {}'s turn.", player.name)));
            }
            self.arm_skip(now);
        }
        effects
    }

    /// Hand the driver role to `target`.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidMode` unless the mode is driver or democracy.
    /// - `AppError::Unauthorized` unless `requester` is the driver or a moderator.
    pub fn transfer_driver(
        &mut self,
        requester: &Participant,
        target: Participant,
        is_moderator: bool,
    ) -> Result<Vec<Effect>> {
        if !matches!(self.mode, InputMode::Driver | InputMode::Democracy) {
            return Err(AppError::InvalidMode(format!(
                "the driver role does not apply in {} mode",
                self.mode
            )));
        }
        if requester.id != self.driver.id && !is_moderator {
            return Err(AppError::Unauthorized(
                "only the current driver or a moderator can pass the wheel".into(),
            ));
        }

        let notice = Effect::Notice(format!("{} is now driving.", target.name));
        self.driver = target;
        Ok(vec![notice])
    }

    /// Add a player to the round-robin rotation.
    pub fn join(&mut self, player: Participant, now: Instant) -> Vec<Effect> {
        let name = player.name.clone();
        if !self.turns.join(player) {
            return Vec::new();
        }
        let mut effects = vec![Effect::Notice(format!("{name} joined the rotation."))];
        if self.mode == InputMode::RoundRobin && self.skip_at.is_none() {
            self.arm_skip(now);
            if let Some(current) = self.turns.current() {
                effects.push(Effect::Notice(format!("It is {}'s turn.", current.name)));
            }
        }
        effects
    }

    /// Remove a player from the round-robin rotation.
    pub fn leave(&mut self, player: &Participant, now: Instant) -> Vec<Effect> {
        let was_turn = self.turns.is_turn(&player.id);
        if !self.turns.leave(&player.id) {
            return Vec::new();
        }

        let mut effects = vec![Effect::Notice(format!(
            "{} left the rotation.",
            player.name
        ))];
        if self.mode == InputMode::RoundRobin {
            if was_turn {
                self.skip_at = None;
                if let Some(current) = self.turns.current() {
                    effects.push(Effect::Notice(format!("It is {}'s turn.", current.name)));
                }
                self.arm_skip(now);
            } else if self.turns.len() <= 1 {
                self.skip_at = None;
            }
        }
        effects
    }

    /// Earliest instant at which [`Arbiter::on_deadline`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let vote = self.round.map(|round| {
            if round.warned {
                round.started + self.timings.democracy_window
            } else {
                round.started + self.timings.democracy_warning
            }
        });
        match (vote, self.skip_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every deadline that has passed at `now`.
    pub fn on_deadline(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(mut round) = self.round {
            if !round.warned && now >= round.started + self.timings.democracy_warning {
                round.warned = true;
                self.round = Some(round);
                let remaining = self
                    .timings
                    .democracy_window
                    .saturating_sub(self.timings.democracy_warning)
                    .as_secs();
                effects.push(Effect::Notice(format!(
                    "{remaining} seconds of voting remaining."
                )));
            }
            if now >= round.started + self.timings.democracy_window {
                self.round = None;
                self.close_vote(&mut effects);
            }
        }

        if self.skip_at.is_some_and(|at| now >= at) {
            self.skip_at = None;
            let skipped = self.turns.current().map(|p| p.name.clone());
            if let Some(name) = skipped {
                effects.push(Effect::Notice(format!("{name} took too long and was skipped.")));
            }
            self.advance_turn(now, &mut effects);
        }

        effects
    }

    /// Drop any open vote and pending skip.
    pub fn cancel_timers(&mut self) {
        self.round = None;
        self.tally.clear();
        self.skip_at = None;
    }

    fn vote(&mut self, from: &Participant, text: &str, now: Instant) -> Vec<Effect> {
        let action = action::canonicalize(text);
        if !self.tally.cast(&from.id, &action) {
            debug!(player = %from.id, "ignoring repeat vote");
            return Vec::new();
        }
        if self.round.is_none() {
            self.round = Some(VotingRound::open(now));
        }
        vec![Effect::Notice(format!(
            "{} has voted for `{action}`.",
            from.name
        ))]
    }

    fn close_vote(&mut self, effects: &mut Vec<Effect>) {
        match self.tally.resolve() {
            Resolution::Winner { action, votes } => {
                effects.push(Effect::Notice(format!(
                    "Voting closed. Running \"{action}\" with {votes} vote(s)."
                )));
                effects.push(Effect::Forward(action));
            }
            Resolution::Draw(actions) => {
                let quoted: Vec<String> = actions.iter().map(|a| format!("\"{a}\"")).collect();
                effects.push(Effect::Notice(format!(
                    "Voting draw between {}. Discarding all votes.",
                    quoted.join(" and ")
                )));
            }
            Resolution::Empty => {}
        }
    }

    fn advance_turn(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        self.skip_at = None;
        let solo = self.turns.len() == 1;
        if let Some(next) = self.turns.advance() {
            if !solo {
                effects.push(Effect::Notice(format!("It is {}'s turn.", next.name)));
            }
        }
        self.arm_skip(now);
    }

    /// Arm the skip timer; a lone player is never skipped.
    fn arm_skip(&mut self, now: Instant) {
        if self.mode == InputMode::RoundRobin && self.turns.len() > 1 {
            self.skip_at = Some(now + self.timings.round_robin_skip);
        }
    }
}
