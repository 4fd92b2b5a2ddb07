//! Unit tests for chat command parsing.

use storyplex::arbitration::InputMode;
use storyplex::chat::commands::{is_confirmation, usage};
use storyplex::chat::ChatCommand;

fn parse(text: &str) -> Option<ChatCommand> {
    ChatCommand::parse(text, "!")
}

#[test]
fn game_input_marker_is_stripped() {
    assert_eq!(parse(">open mailbox"), Some(ChatCommand::GameInput("open mailbox".into())));
    assert_eq!(parse("  >  n  "), Some(ChatCommand::GameInput("n".into())));
    assert_eq!(parse(">"), Some(ChatCommand::GameInput(String::new())));
}

#[test]
fn ordinary_chat_is_ignored() {
    assert_eq!(parse("hello everyone"), None);
    assert_eq!(parse("!dance"), None);
    assert_eq!(parse(""), None);
}

#[test]
fn play_takes_the_rest_as_query() {
    assert_eq!(parse("!play Zork I"), Some(ChatCommand::Play("Zork I".into())));
    assert_eq!(parse("!PLAY   anchor "), Some(ChatCommand::Play("anchor".into())));
    assert_eq!(parse("!play"), Some(ChatCommand::Usage("play")));
}

#[test]
fn indent_needs_a_number() {
    assert_eq!(parse("!indent 2"), Some(ChatCommand::Indent(2)));
    assert_eq!(parse("!indent two"), Some(ChatCommand::Usage("indent")));
    assert_eq!(parse("!indent"), Some(ChatCommand::Usage("indent")));
}

#[test]
fn mode_names_are_parsed() {
    assert_eq!(parse("!mode democracy"), Some(ChatCommand::Mode(InputMode::Democracy)));
    assert_eq!(parse("!mode round robin"), Some(ChatCommand::Mode(InputMode::RoundRobin)));
    assert_eq!(parse("!mode chaos"), Some(ChatCommand::Usage("mode")));
}

#[test]
fn simple_commands_and_aliases() {
    assert_eq!(parse("!list"), Some(ChatCommand::List));
    assert_eq!(parse("!output"), Some(ChatCommand::Output));
    assert_eq!(parse("!forcequit"), Some(ChatCommand::ForceQuit));
    assert_eq!(parse("!mortim"), Some(ChatCommand::ForceQuit));
    assert_eq!(parse("!driver @bo"), Some(ChatCommand::Driver));
    assert_eq!(parse("!join"), Some(ChatCommand::Join));
    assert_eq!(parse("!leave"), Some(ChatCommand::Leave));
    assert_eq!(parse("!help"), Some(ChatCommand::Help(None)));
    assert_eq!(parse("!help Indent"), Some(ChatCommand::Help(Some("indent".into()))));
}

#[test]
fn custom_prefix_is_honoured() {
    assert_eq!(ChatCommand::parse("zy list", "zy"), Some(ChatCommand::List));
    assert_eq!(ChatCommand::parse("!list", "zy"), None);
}

#[test]
fn usage_lines_include_arguments() {
    assert_eq!(usage("!", "indent").as_deref(), Some("!indent <columns>"));
    assert_eq!(usage("!", "list").as_deref(), Some("!list"));
    assert_eq!(usage("!", "nope"), None);
}

#[test]
fn force_quit_confirmation_accepts_yes_forms() {
    for reply in ["y", "Y", "yes", " YES ", "`y`", "!yes", "`!y`"] {
        assert!(is_confirmation(reply, "!"), "{reply:?} should confirm");
    }
    for reply in ["no", "yess", "ye", "> yes", "sure", ""] {
        assert!(!is_confirmation(reply, "!"), "{reply:?} should not confirm");
    }
}
