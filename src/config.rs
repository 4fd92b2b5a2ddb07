//! Global configuration parsing and validation.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::arbitration::ArbitrationTimings;
use crate::models::program::{Catalog, Program};
use crate::story::{ComposeOptions, OutputEncoding, DEFAULT_MESSAGE_LIMIT, MIN_MESSAGE_LIMIT};
use crate::{AppError, Result};

/// How the interpreter executable is launched.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InterpreterConfig {
    /// Interpreter binary (a dumb-terminal Z-machine such as `dfrotz`).
    #[serde(default = "default_interpreter")]
    pub command: String,
    /// Extra arguments placed before the generated flags.
    #[serde(default)]
    pub args: Vec<String>,
    /// Output width in columns; wide enough that the interpreter never wraps.
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    /// Nominal terminal height in rows.
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Decoding applied to interpreter output.
    #[serde(default)]
    pub output_encoding: OutputEncoding,
    /// Quiet period that ends one output message.
    #[serde(default = "default_idle_flush_ms")]
    pub idle_flush_ms: u64,
}

impl InterpreterConfig {
    /// Quiet period after which buffered output is flushed.
    #[must_use]
    pub fn idle_flush(&self) -> Duration {
        Duration::from_millis(self.idle_flush_ms)
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: default_interpreter(),
            args: Vec::new(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            output_encoding: OutputEncoding::default(),
            idle_flush_ms: default_idle_flush_ms(),
        }
    }
}

/// Timer lengths for democracy and round-robin arbitration (seconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ArbitrationConfig {
    /// Length of a voting round.
    #[serde(default = "default_democracy_window")]
    pub democracy_window_seconds: u64,
    /// When in the round the "time remaining" notice is posted.
    #[serde(default = "default_democracy_warning")]
    pub democracy_warning_seconds: u64,
    /// Idle time before a round-robin player is skipped.
    #[serde(default = "default_round_robin_skip")]
    pub round_robin_skip_seconds: u64,
}

impl ArbitrationConfig {
    /// Convert to the durations used by the arbiter.
    #[must_use]
    pub fn timings(&self) -> ArbitrationTimings {
        ArbitrationTimings {
            democracy_window: Duration::from_secs(self.democracy_window_seconds),
            democracy_warning: Duration::from_secs(self.democracy_warning_seconds),
            round_robin_skip: Duration::from_secs(self.round_robin_skip_seconds),
        }
    }
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            democracy_window_seconds: default_democracy_window(),
            democracy_warning_seconds: default_democracy_warning(),
            round_robin_skip_seconds: default_round_robin_skip(),
        }
    }
}

/// Outbound message shaping.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OutputConfig {
    /// Character limit per chat message.
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
        }
    }
}

fn default_interpreter() -> String {
    "dfrotz".into()
}

fn default_screen_width() -> u32 {
    5000
}

fn default_screen_height() -> u32 {
    80
}

fn default_idle_flush_ms() -> u64 {
    500
}

fn default_democracy_window() -> u64 {
    15
}

fn default_democracy_warning() -> u64 {
    10
}

fn default_round_robin_skip() -> u64 {
    5
}

fn default_message_limit() -> usize {
    DEFAULT_MESSAGE_LIMIT
}

fn default_saves_root() -> PathBuf {
    PathBuf::from("./saves")
}

fn default_outbox_dir() -> PathBuf {
    PathBuf::from("./outbox")
}

fn default_command_prefix() -> String {
    "!".into()
}

fn default_max_concurrent_sessions() -> u32 {
    50
}

fn default_force_quit_confirm_seconds() -> u64 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding one save directory per active channel.
    #[serde(default = "default_saves_root")]
    pub saves_root: PathBuf,
    /// Directory where the stdio transport writes outbound attachments.
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,
    /// Prefix marking a bot command in chat.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Maximum number of channels playing at once.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: u32,
    /// Seconds a force-quit request waits for a yes/no reply.
    #[serde(default = "default_force_quit_confirm_seconds")]
    pub force_quit_confirm_seconds: u64,
    /// Interpreter launch settings.
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    /// Arbitration timers.
    #[serde(default)]
    pub arbitration: ArbitrationConfig,
    /// Message shaping.
    #[serde(default)]
    pub output: OutputConfig,
    /// Playable stories.
    #[serde(default)]
    pub programs: Vec<Program>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// Relative story paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        let mut config = Self::from_toml_str(&raw)?;

        if let Some(base) = path.parent() {
            for program in &mut config.programs {
                if program.path.is_relative() {
                    program.path = base.join(&program.path);
                }
            }
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the story catalog, delisting stories whose files are missing.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        Catalog::from_programs(self.programs.clone())
    }

    /// Save directory for a channel, always a direct child of `saves_root`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` if `channel_id` is empty or is not a
    /// single plain path component (`..`, `.`, separators, absolute paths).
    pub fn save_dir(&self, channel_id: &str) -> Result<PathBuf> {
        let mut components = Path::new(channel_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == channel_id => {
                Ok(self.saves_root.join(name))
            }
            _ => Err(AppError::PathViolation(format!(
                "channel id {channel_id:?} is not usable as a directory name"
            ))),
        }
    }

    /// How long a force-quit waits for the author's confirmation.
    #[must_use]
    pub fn force_quit_window(&self) -> Duration {
        Duration::from_secs(self.force_quit_confirm_seconds)
    }

    /// Base compositor settings; sessions override the indent.
    #[must_use]
    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            indent: 0,
            limit: self.output.message_limit,
            encoding: self.interpreter.output_encoding,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_sessions == 0 {
            return Err(AppError::Config(
                "max_concurrent_sessions must be greater than zero".into(),
            ));
        }

        if self.force_quit_confirm_seconds == 0 {
            return Err(AppError::Config(
                "force_quit_confirm_seconds must be greater than zero".into(),
            ));
        }

        if self.interpreter.command.trim().is_empty() {
            return Err(AppError::Config(
                "interpreter.command must not be empty".into(),
            ));
        }

        if self.interpreter.idle_flush_ms == 0 {
            return Err(AppError::Config(
                "interpreter.idle_flush_ms must be greater than zero".into(),
            ));
        }

        if self.arbitration.democracy_warning_seconds >= self.arbitration.democracy_window_seconds
        {
            return Err(AppError::Config(
                "arbitration.democracy_warning_seconds must be less than democracy_window_seconds"
                    .into(),
            ));
        }

        if self.output.message_limit < MIN_MESSAGE_LIMIT {
            return Err(AppError::Config(
                format!("output.message_limit must be at least {MIN_MESSAGE_LIMIT}"),
            ));
        }

        if self.command_prefix.is_empty() || self.command_prefix.starts_with('>') {
            return Err(AppError::Config(
                "command_prefix must be non-empty and must not start with '>'".into(),
            ));
        }

        Ok(())
    }
}
