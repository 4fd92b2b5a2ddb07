//! Bot command parsing.
//!
//! | Text                     | Command                        |
//! |--------------------------|--------------------------------|
//! | `>look`, `!>look`        | [`ChatCommand::GameInput`]     |
//! | `!play <story>`          | [`ChatCommand::Play`]          |
//! | `!list`                  | [`ChatCommand::List`]          |
//! | `!indent <n>`            | [`ChatCommand::Indent`]        |
//! | `!output`                | [`ChatCommand::Output`]        |
//! | `!forcequit`, `!mortim`  | [`ChatCommand::ForceQuit`]     |
//! | `!mode <mode>`           | [`ChatCommand::Mode`]          |
//! | `!driver @user`          | [`ChatCommand::Driver`]        |
//! | `!join`, `!leave`        | [`ChatCommand::Join`]/[`ChatCommand::Leave`] |
//! | `!help [command]`        | [`ChatCommand::Help`]          |
//!
//! Unknown commands and ordinary chat parse to `None` and are ignored.

use crate::arbitration::InputMode;

/// Marks a message as input for the running game.
pub const GAME_INPUT_MARKER: char = '>';

/// Name, argument synopsis and one-line description of each command.
pub const COMMAND_HELP: &[(&str, &str, &str)] = &[
    ("play", "<story>", "Start a story in this channel. Attach a save file to restore it."),
    ("list", "", "List the stories that can be played."),
    ("indent", "<columns>", "Drop this many leading columns from every line of story output."),
    ("output", "", "Toggle mirroring story output into the bot's log."),
    ("forcequit", "", "Stop the story running in this channel after you confirm. Alias: mortim."),
    ("mode", "<anarchy|democracy|driver|roundrobin>", "Change who gets to send game input."),
    ("driver", "@user", "Hand the driver role to the mentioned user."),
    ("join", "", "Join the round-robin rotation."),
    ("leave", "", "Leave the round-robin rotation."),
    ("help", "[command]", "Show this help, or details for one command."),
];

/// A recognised chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Input for the running game, marker removed.
    GameInput(String),
    /// Start a story matching the query.
    Play(String),
    /// List playable stories.
    List,
    /// Set the output indent.
    Indent(usize),
    /// Toggle log echo of story output.
    Output,
    /// Stop the running story.
    ForceQuit,
    /// Change the input mode.
    Mode(InputMode),
    /// Pass the driver role to the first mentioned user.
    Driver,
    /// Join the rotation.
    Join,
    /// Leave the rotation.
    Leave,
    /// Show help, optionally for one command.
    Help(Option<String>),
    /// A known command with bad arguments; carries the command name.
    Usage(&'static str),
}

impl ChatCommand {
    /// Parse a chat message. `prefix` marks bot commands.
    #[must_use]
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(input) = text.strip_prefix(GAME_INPUT_MARKER) {
            return Some(Self::GameInput(input.trim().to_owned()));
        }

        let body = text.strip_prefix(prefix)?.trim_start();
        if let Some(input) = body.strip_prefix(GAME_INPUT_MARKER) {
            return Some(Self::GameInput(input.trim().to_owned()));
        }

        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "play" if args.is_empty() => Self::Usage("play"),
            "play" => Self::Play(args.to_owned()),
            "list" => Self::List,
            "indent" => args.parse().map_or(Self::Usage("indent"), Self::Indent),
            "output" => Self::Output,
            "forcequit" | "mortim" => Self::ForceQuit,
            "mode" => args.parse().map_or(Self::Usage("mode"), Self::Mode),
            "driver" => Self::Driver,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "help" if args.is_empty() => Self::Help(None),
            "help" => Self::Help(Some(args.to_lowercase())),
            _ => return None,
        };
        Some(command)
    }
}

/// Whether a reply accepts a force-quit prompt: `y` or `yes`, optionally
/// behind the command prefix or wrapped in backticks.
#[must_use]
pub fn is_confirmation(text: &str, prefix: &str) -> bool {
    let text = text.trim().to_lowercase();
    let text = text.strip_prefix('`').unwrap_or(&text);
    let text = text.strip_suffix('`').unwrap_or(text);
    let text = text.strip_prefix(prefix).unwrap_or(text);
    matches!(text, "y" | "yes")
}

/// Usage line for `name`, e.g. `!indent <columns>`.
#[must_use]
pub fn usage(prefix: &str, name: &str) -> Option<String> {
    COMMAND_HELP
        .iter()
        .find(|(command, _, _)| *command == name)
        .map(|(command, args, _)| {
            if args.is_empty() {
                format!("{prefix}{command}")
            } else {
                format!("{prefix}{command} {args}")
            }
        })
}
