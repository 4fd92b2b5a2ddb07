//! Canonical action tokens for democracy voting.
//!
//! Players type the same intent in many ways ("north", "go north", "n").
//! Votes are tallied per canonical token so synonyms count together.

/// Sentinel token that sends an empty line to the interpreter.
pub const ENTER: &str = "ENTER";

/// Sentinel token that sends a single space to the interpreter.
pub const SPACE: &str = "SPACE";

/// Short token and long name for each compass and vertical direction.
const DIRECTIONS: &[(&str, &str)] = &[
    ("n", "north"),
    ("s", "south"),
    ("e", "east"),
    ("w", "west"),
    ("ne", "northeast"),
    ("nw", "northwest"),
    ("se", "southeast"),
    ("sw", "southwest"),
    ("u", "up"),
    ("d", "down"),
];

const MOVE_VERBS: &[&str] = &["go", "walk", "run"];

/// Reduce a player's input to the canonical token used for vote counting.
///
/// Unrecognised input is lower-cased (with runs of whitespace collapsed) and
/// otherwise passed through.
#[must_use]
pub fn canonicalize(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed == ENTER {
        return ENTER.to_owned();
    }

    let action = trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if let Some(short) = direction(&action) {
        return short.to_owned();
    }

    match action.as_str() {
        "[enter]" | "(enter)" | "{enter}" | "<enter>" => return ENTER.to_owned(),
        "space" | "[space]" | "(space)" | "{space}" | "<space>" => return SPACE.to_owned(),
        "z" | "wait" => return "wait".to_owned(),
        "i" | "inv" | "inventory" => return "inventory".to_owned(),
        "l" | "look" => return "look".to_owned(),
        _ => {}
    }

    if let Some((verb, rest)) = action.split_once(' ') {
        match verb {
            "x" | "examine" => return format!("examine {rest}"),
            "l" | "look" => return format!("look {rest}"),
            _ => {}
        }
    }

    action
}

fn direction(action: &str) -> Option<&'static str> {
    let target = MOVE_VERBS
        .iter()
        .find_map(|verb| {
            action
                .strip_prefix(verb)
                .and_then(|rest| rest.strip_prefix(' '))
        })
        .unwrap_or(action);

    DIRECTIONS
        .iter()
        .find(|(short, long)| target == *short || target == *long)
        .map(|(short, _)| *short)
}
