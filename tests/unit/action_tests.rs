//! Unit tests for vote canonicalization.

use storyplex::arbitration::action::{canonicalize, ENTER, SPACE};

#[test]
fn direction_synonyms_collapse_to_short_token() {
    for input in ["n", "north", "go north", "walk north", "run north", "GO  North", "go n"] {
        assert_eq!(canonicalize(input), "n", "input {input:?}");
    }
    assert_eq!(canonicalize("walk southwest"), "sw");
    assert_eq!(canonicalize("up"), "u");
}

#[test]
fn placeholder_phrases_become_sentinels() {
    assert_eq!(canonicalize("[enter]"), ENTER);
    assert_eq!(canonicalize("<ENTER>"), ENTER);
    assert_eq!(canonicalize("ENTER"), ENTER);
    assert_eq!(canonicalize("space"), SPACE);
    assert_eq!(canonicalize("{space}"), SPACE);
}

#[test]
fn examine_and_look_forms_collapse() {
    assert_eq!(canonicalize("x lamp"), "examine lamp");
    assert_eq!(canonicalize("Examine   Lamp"), "examine lamp");
    assert_eq!(canonicalize("l"), "look");
    assert_eq!(canonicalize("l under rug"), "look under rug");
}

#[test]
fn wait_and_inventory_collapse() {
    assert_eq!(canonicalize("z"), "wait");
    assert_eq!(canonicalize("WAIT"), "wait");
    assert_eq!(canonicalize("i"), "inventory");
    assert_eq!(canonicalize("inv"), "inventory");
}

#[test]
fn unknown_input_is_lowercased_and_passed_through() {
    assert_eq!(canonicalize("Open Mailbox"), "open mailbox");
    assert_eq!(canonicalize("  xyzzy  "), "xyzzy");
}
