//! Integration tests for the interpreter supervisor, driven by a shell
//! script standing in for the interpreter.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use serial_test::serial;
use tokio::sync::mpsc;
use tokio::time::timeout;

use storyplex::arbitration::action::ENTER;
use storyplex::config::InterpreterConfig;
use storyplex::orchestrator::drain::DrainEvent;
use storyplex::orchestrator::supervisor::{interpreter_args, Supervisor};
use storyplex::saves::UPLOAD_SENTINEL;
use storyplex::AppError;

use super::test_helpers::{write_file, Fixture};

async fn next_event(events: &mut mpsc::Receiver<DrainEvent>) -> DrainEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("interpreter event")
        .expect("event channel open")
}

async fn next_output(events: &mut mpsc::Receiver<DrainEvent>) -> String {
    match next_event(events).await {
        DrainEvent::Idle(bytes) => String::from_utf8(bytes).unwrap(),
        other => panic!("expected output, got {other:?}"),
    }
}

/// Collect output until exit; returns everything printed and the exit code.
async fn run_to_exit(events: &mut mpsc::Receiver<DrainEvent>) -> (String, Option<i32>) {
    let mut printed = String::new();
    loop {
        match next_event(events).await {
            DrainEvent::Idle(bytes) => printed.push_str(&String::from_utf8(bytes).unwrap()),
            DrainEvent::Exited { output, exit_code } => {
                printed.push_str(&String::from_utf8(output).unwrap());
                return (printed, exit_code);
            }
        }
    }
}

#[test]
fn arguments_follow_the_interpreter_convention() {
    let config = InterpreterConfig {
        args: vec!["-q".into()],
        ..InterpreterConfig::default()
    };

    let args = interpreter_args(
        &config,
        Path::new("/games/zork1.z5"),
        Path::new("/saves/C1"),
        Some(Path::new("/saves/C1/__UPLOADED__.qzl")),
    );

    let expected: Vec<OsString> = [
        "-q",
        "-h",
        "80",
        "-w",
        "5000",
        "-m",
        "-R",
        "/saves/C1",
        "-L",
        "/saves/C1/__UPLOADED__.qzl",
        "/games/zork1.z5",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    assert_eq!(args, expected);
}

#[test]
fn restore_flag_is_omitted_without_restore() {
    let args = interpreter_args(
        &InterpreterConfig::default(),
        Path::new("story.z5"),
        Path::new("saves"),
        None,
    );

    assert!(!args.iter().any(|a| a == "-L"));
    assert_eq!(
        args.last().map(OsString::as_os_str),
        Some(std::ffi::OsStr::new("story.z5"))
    );
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn input_round_trips_through_interpreter() {
    let fixture = Fixture::new(1);
    let save_dir = fixture.config.save_dir("C1").unwrap();
    let mut supervisor = Supervisor::new("C1");

    let mut events = supervisor
        .start(
            &fixture.config.interpreter,
            &fixture.program().path,
            &save_dir,
            None,
        )
        .await
        .unwrap();
    assert!(supervisor.is_running());
    assert!(supervisor.pid().is_some());

    assert_eq!(next_output(&mut events).await, "Welcome to the fake story.\n");

    supervisor.write_input("open mailbox").await.unwrap();
    assert_eq!(next_output(&mut events).await, "You said: open mailbox\n");

    supervisor.write_input(ENTER).await.unwrap();
    assert_eq!(next_output(&mut events).await, "[enter]\n");

    supervisor.write_input("quit").await.unwrap();
    let (printed, exit_code) = run_to_exit(&mut events).await;
    assert!(printed.contains("Goodbye."));
    assert_eq!(exit_code, Some(0));
    assert!(!supervisor.is_running());

    let err = supervisor.write_input("look").await.unwrap_err();
    assert!(matches!(err, AppError::NotRunning(_)));
    supervisor.terminate().expect("terminating an exited interpreter is a no-op");
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn start_wipes_save_dir_and_stages_restore() {
    let fixture = Fixture::new(1);
    let save_dir = fixture.config.save_dir("C2").unwrap();
    std::fs::create_dir_all(&save_dir).unwrap();
    std::fs::write(save_dir.join("stale.sav"), b"old").unwrap();
    let upload = write_file(&fixture.path("upload.qzl"), b"quetzal bytes");
    let mut supervisor = Supervisor::new("C2");

    let mut events = supervisor
        .start(
            &fixture.config.interpreter,
            &fixture.program().path,
            &save_dir,
            Some(upload.as_path()),
        )
        .await
        .unwrap();

    let banner = next_output(&mut events).await;
    assert!(banner.contains(&format!("Restored from {UPLOAD_SENTINEL}.")));
    assert!(!save_dir.join("stale.sav").exists());
    assert_eq!(
        std::fs::read(save_dir.join(UPLOAD_SENTINEL)).unwrap(),
        b"quetzal bytes"
    );

    supervisor.terminate().unwrap();
    run_to_exit(&mut events).await;
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn terminate_stops_a_waiting_interpreter() {
    let fixture = Fixture::new(1);
    let mut supervisor = Supervisor::new("C3");
    let mut events = supervisor
        .start(
            &fixture.config.interpreter,
            &fixture.program().path,
            &fixture.config.save_dir("C3").unwrap(),
            None,
        )
        .await
        .unwrap();
    next_output(&mut events).await;

    supervisor.terminate().unwrap();

    let (_, exit_code) = run_to_exit(&mut events).await;
    assert_eq!(exit_code, None, "killed by a signal");
    assert!(!supervisor.is_running());
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn second_start_is_refused() {
    let fixture = Fixture::new(1);
    let save_dir = fixture.config.save_dir("C4").unwrap();
    let mut supervisor = Supervisor::new("C4");
    let mut events = supervisor
        .start(&fixture.config.interpreter, &fixture.program().path, &save_dir, None)
        .await
        .unwrap();

    let err = supervisor
        .start(&fixture.config.interpreter, &fixture.program().path, &save_dir, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyRunning(_)));

    supervisor.terminate().unwrap();
    run_to_exit(&mut events).await;
}

#[tokio::test]
async fn unstarted_supervisor_is_not_running() {
    let mut supervisor = Supervisor::new("C5");

    assert!(!supervisor.is_running());
    assert!(matches!(supervisor.terminate(), Err(AppError::NotRunning(_))));
    assert!(matches!(
        supervisor.write_input("look").await,
        Err(AppError::NotRunning(_))
    ));
}

#[tokio::test]
async fn missing_interpreter_is_a_process_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = InterpreterConfig {
        command: "/nonexistent/storyplex-interpreter".into(),
        ..InterpreterConfig::default()
    };
    let mut supervisor = Supervisor::new("C6");

    let err = supervisor
        .start(&config, Path::new("story.z5"), &tmp.path().join("C6"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Process(_)));
    assert!(!supervisor.is_running());
}
