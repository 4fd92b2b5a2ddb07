//! Integration tests for chat command dispatch.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;

use storyplex::chat::Dispatcher;
use storyplex::messaging::{InboundEvent, MessageKind};
use storyplex::orchestrator::SessionRegistry;
use storyplex::AppError;

use super::test_helpers::{
    eventually, player, save_blob, write_file, Fixture, RecordingMessenger, STORY_CHECKSUM,
    STORY_RELEASE, STORY_SERIAL,
};

fn dispatcher(fixture: &Fixture, recorder: &Arc<RecordingMessenger>) -> Dispatcher {
    Dispatcher::new(
        Arc::new(fixture.config.clone()),
        fixture.config.catalog(),
        SessionRegistry::new(),
        recorder.clone(),
    )
}

fn event(author: &str, text: &str) -> InboundEvent {
    InboundEvent {
        channel_id: "C1".into(),
        author: player(author),
        text: text.into(),
        is_moderator: false,
        mentions: Vec::new(),
        attachment: None,
    }
}

fn upload(author: &str, text: &str, file: PathBuf) -> InboundEvent {
    InboundEvent {
        attachment: Some(file),
        ..event(author, text)
    }
}

async fn quit(dispatcher: &Dispatcher, recorder: &RecordingMessenger) {
    dispatcher.handle(event("owner", "!forcequit")).await.unwrap();
    recorder.wait_for_text("Are you sure you want to quit?").await;
    dispatcher.handle(event("owner", "yes")).await.unwrap();
    recorder.wait_for_text("The game has ended.").await;
    eventually("registry cleanup", || async move {
        dispatcher.registry().is_empty().await
    })
    .await;
}

#[tokio::test]
async fn list_shows_catalog() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("alice", "!list")).await.unwrap();

    let reply = recorder.wait_for_text("Available stories:").await;
    assert_eq!(reply.kind, MessageKind::Notice);
    assert_eq!(
        reply.text,
        "Available stories:\n- Fake Story by Test Suite (also: fake)"
    );
}

#[tokio::test]
async fn ordinary_chat_and_unknown_commands_are_ignored() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("alice", "hello there")).await.unwrap();
    dispatcher.handle(event("alice", "!dance")).await.unwrap();
    dispatcher.handle(event("alice", ">look")).await.unwrap();

    assert!(recorder.messages().await.is_empty());
}

#[tokio::test]
async fn user_errors_are_posted_back() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("alice", "!play zork")).await.unwrap();
    recorder
        .wait_for_text("I couldn't find any stories matching \"zork\".")
        .await;

    dispatcher.handle(event("alice", "!indent 2")).await.unwrap();
    recorder
        .wait_for_text("Nothing is being played in this channel.")
        .await;

    dispatcher.handle(event("alice", "!indent wide")).await.unwrap();
    recorder.wait_for_text("Usage: !indent <columns>").await;

    dispatcher.handle(event("alice", "!driver")).await.unwrap();
    recorder
        .wait_for_text("Mention the user who should drive.")
        .await;
}

#[tokio::test]
async fn help_lists_commands_and_topics() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("alice", "!help")).await.unwrap();
    let overview = recorder.wait_for_text("Commands:").await;
    assert!(overview.text.contains("!play <story>"));
    assert!(overview.text.contains("!leave"));

    dispatcher.handle(event("alice", "!help !mortim")).await.unwrap();
    let topic = recorder.wait_for_text("Alias: mortim").await;
    assert!(topic.text.starts_with("!forcequit\n"));

    dispatcher.handle(event("alice", "!help xyzzy")).await.unwrap();
    recorder
        .wait_for_text("No information found on \"xyzzy\".")
        .await;
}

#[tokio::test]
#[serial]
async fn play_input_and_force_quit() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("owner", "!play fake")).await.unwrap();
    let loaded = recorder.wait_for_text("Loaded \"Fake Story\".").await;
    assert_eq!(loaded.text, "Loaded \"Fake Story\".\nhttps://example.org/fake");
    recorder.wait_for_text("Welcome to the fake story.").await;

    dispatcher.handle(event("bob", "> look")).await.unwrap();
    recorder.wait_for_text("You said: look").await;

    dispatcher.handle(event("bob", "!>")).await.unwrap();
    recorder.wait_for_text("[enter]").await;

    dispatcher.handle(event("bob", "!play fake")).await.unwrap();
    recorder
        .wait_for_text("This channel is currently playing \"Fake Story\".")
        .await;

    dispatcher.handle(event("bob", "!mode democracy")).await.unwrap();
    recorder
        .wait_for_text("Only the player who started the game or a moderator")
        .await;

    quit(&dispatcher, &recorder).await;
}

#[tokio::test]
#[serial]
async fn uploaded_save_must_match_story() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    let foreign = write_file(
        &fixture.path("foreign.qzl"),
        &save_blob(STORY_RELEASE + 1, STORY_SERIAL, STORY_CHECKSUM),
    );
    dispatcher
        .handle(upload("owner", "!play fake", foreign))
        .await
        .unwrap();
    recorder
        .wait_for_text("save file belongs to a different story")
        .await;

    let garbage = write_file(&fixture.path("garbage.qzl"), b"definitely not a save file");
    dispatcher
        .handle(upload("owner", "!play fake", garbage))
        .await
        .unwrap();
    recorder.wait_for_text("invalid file format").await;
    assert!(dispatcher.registry().is_empty().await);

    let matching = write_file(
        &fixture.path("mine.qzl"),
        &save_blob(STORY_RELEASE, STORY_SERIAL, STORY_CHECKSUM),
    );
    dispatcher
        .handle(upload("owner", "!play fake", matching))
        .await
        .unwrap();
    recorder.wait_for_text("Restored from __UPLOADED__.qzl.").await;

    quit(&dispatcher, &recorder).await;
}

#[tokio::test]
#[serial]
async fn driver_command_uses_first_mention() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("owner", "!play fake")).await.unwrap();
    recorder.wait_for_text("Welcome").await;
    dispatcher.handle(event("owner", "!mode driver")).await.unwrap();
    recorder.wait_for_text("Input mode is now driver.").await;

    let pass = InboundEvent {
        mentions: vec![player("carol"), player("dave")],
        ..event("owner", "!driver @carol @dave")
    };
    dispatcher.handle(pass).await.unwrap();
    recorder.wait_for_text("CAROL is now driving.").await;

    dispatcher.handle(event("owner", ">owner move")).await.unwrap();
    dispatcher.handle(event("carol", ">carol move")).await.unwrap();
    recorder.wait_for_text("You said: carol move").await;
    let texts = recorder.texts().await;
    assert!(!texts.iter().any(|t| t.contains("owner move")));

    quit(&dispatcher, &recorder).await;
}

#[tokio::test]
#[serial]
async fn force_quit_waits_for_confirmation() {
    let fixture = Fixture::new(5);
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("owner", "!play fake")).await.unwrap();
    recorder.wait_for_text("Welcome").await;

    dispatcher.handle(event("owner", "!mortim")).await.unwrap();
    let prompt = recorder.wait_for_text("Are you sure you want to quit?").await;
    assert!(prompt.text.contains("You will lose all unsaved progress!"));

    // Someone else's message does not answer the prompt.
    dispatcher.handle(event("bob", "y")).await.unwrap();
    dispatcher.handle(event("owner", "no thanks")).await.unwrap();
    recorder.wait_for_text("Continuing game.").await;

    dispatcher.handle(event("bob", ">look")).await.unwrap();
    recorder.wait_for_text("You said: look").await;
    assert!(dispatcher.registry().get("C1").await.is_some());

    quit(&dispatcher, &recorder).await;
}

#[tokio::test]
#[serial]
async fn unanswered_force_quit_expires() {
    let mut fixture = Fixture::new(5);
    fixture.config.force_quit_confirm_seconds = 1;
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    dispatcher.handle(event("owner", "!play fake")).await.unwrap();
    recorder.wait_for_text("Welcome").await;
    dispatcher.handle(event("owner", "!forcequit")).await.unwrap();

    recorder
        .wait_for_text("Message timeout expired. Continuing game.")
        .await;

    // A late "yes" is ordinary chat again.
    dispatcher.handle(event("owner", "yes")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(dispatcher.registry().get("C1").await.is_some());
    assert!(!recorder.texts().await.iter().any(|t| t.contains("The game has ended.")));

    quit(&dispatcher, &recorder).await;
}

#[tokio::test]
#[serial]
async fn channel_ids_cannot_escape_the_saves_root() {
    let fixture = Fixture::new(5);
    let victim = fixture.path("victim");
    std::fs::create_dir_all(&victim).unwrap();
    let precious = write_file(&victim.join("precious.txt"), b"keep me");
    let recorder = RecordingMessenger::new();
    let dispatcher = dispatcher(&fixture, &recorder);

    for channel_id in ["../victim", "", "/tmp/storyplex-elsewhere", "."] {
        let play = InboundEvent {
            channel_id: channel_id.into(),
            ..event("owner", "!play fake")
        };
        dispatcher.handle(play).await.unwrap();
    }

    let replies = recorder.messages().await;
    assert_eq!(replies.len(), 4);
    assert!(replies
        .iter()
        .all(|m| m.text.contains("is not usable as a directory name")));
    assert!(precious.exists());
    assert!(dispatcher.registry().is_empty().await);

    let err = fixture.config.save_dir("../victim").unwrap_err();
    assert!(matches!(err, AppError::PathViolation(_)));
}
