//! Per-channel session actor.
//!
//! A session owns one interpreter, one arbiter and one save directory. All
//! of that state lives inside a single task; the rest of the bot talks to
//! it through a [`SessionHandle`]. The task reacts to three sources:
//!
//! - [`SessionCommand`]s from chat,
//! - [`DrainEvent`]s from the interpreter,
//! - arbitration deadlines (vote windows and turn skips).
//!
//! The session ends when the interpreter exits, whether on its own or after
//! a force-quit. On the way out it posts the final output and the latest
//! save, removes its save directory and unregisters itself.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use super::drain::DrainEvent;
use super::registry::SessionRegistry;
use super::supervisor::Supervisor;
use crate::arbitration::{Arbiter, Effect, InputMode};
use crate::config::GlobalConfig;
use crate::messaging::{Attachment, Messenger, OutboundMessage};
use crate::models::participant::Participant;
use crate::models::program::Program;
use crate::saves::discovery::{self, SaveFile, SaveTracker};
use crate::story::{compose, ComposeOptions};
use crate::{AppError, Result};

/// Capacity of a session's command queue.
const COMMAND_BUFFER: usize = 64;

/// Posted when a save appears with no story text to carry it.
const SAVED_NOTICE: &str = "Game saved.";

/// Posted when the interpreter exits.
const ENDED_NOTICE: &str = "The game has ended.";

/// Requests handled by a session actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// A player typed game input.
    Input {
        /// Who typed it.
        from: Participant,
        /// The text after the input marker.
        text: String,
    },
    /// Change the arbitration policy.
    SetMode {
        /// Who asked.
        requester: Participant,
        /// Requested policy.
        mode: InputMode,
        /// Whether the requester moderates the channel.
        is_moderator: bool,
    },
    /// Hand the driver role to someone else.
    TransferDriver {
        /// Who asked.
        requester: Participant,
        /// New driver.
        target: Participant,
        /// Whether the requester moderates the channel.
        is_moderator: bool,
    },
    /// Join the round-robin rotation.
    Join(Participant),
    /// Leave the round-robin rotation.
    Leave(Participant),
    /// Strip this many leading columns from story output.
    SetIndent(usize),
    /// Toggle mirroring story output into the log.
    ToggleEcho,
    /// Stop the interpreter and end the session.
    ForceQuit,
}

/// What to start a session with.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Channel the session plays in.
    pub channel_id: String,
    /// Story to run.
    pub program: Program,
    /// User who started the session.
    pub owner: Participant,
    /// Save file to restore at startup.
    pub restore: Option<PathBuf>,
}

/// Cloneable reference to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Channel the session plays in.
    pub channel_id: String,
    /// Name of the story being played.
    pub program_name: String,
    /// User who started the session.
    pub owner: Participant,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    last_activity: Arc<AtomicI64>,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Queue a command for the session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotRunning` if the session has already ended.
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| {
            AppError::NotRunning(format!("session in {} has ended", self.channel_id))
        })
    }

    /// Time of the most recent player input.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity.load(Ordering::Relaxed))
            .unwrap_or(self.started_at)
    }
}

/// Start a session: register it, launch the interpreter and spawn the actor.
///
/// # Errors
///
/// - `AppError::PathViolation` if the channel id cannot name a save directory.
/// - `AppError::AlreadyRunning` if the channel already has a session.
/// - `AppError::Config` if the concurrent session limit is reached.
/// - `AppError::Io` or `AppError::Process` if the interpreter cannot start.
///   The registration is rolled back in that case.
pub async fn spawn_session(
    request: SessionRequest,
    config: &GlobalConfig,
    registry: &SessionRegistry,
    messenger: Arc<dyn Messenger>,
) -> Result<SessionHandle> {
    let span = info_span!(
        "session",
        channel_id = %request.channel_id,
        program = %request.program.name
    );

    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let started_at = Utc::now();
    let handle = SessionHandle {
        channel_id: request.channel_id.clone(),
        program_name: request.program.name.clone(),
        owner: request.owner.clone(),
        started_at,
        last_activity: Arc::new(AtomicI64::new(started_at.timestamp_millis())),
        tx,
    };

    let save_dir = config.save_dir(&request.channel_id)?;
    let max = usize::try_from(config.max_concurrent_sessions).unwrap_or(usize::MAX);
    registry.insert_bounded(handle.clone(), max).await?;

    let mut supervisor = Supervisor::new(request.channel_id.clone());
    let events = match supervisor
        .start(
            &config.interpreter,
            &request.program.path,
            &save_dir,
            request.restore.as_deref(),
        )
        .instrument(span.clone())
        .await
    {
        Ok(events) => events,
        Err(err) => {
            registry.remove(&request.channel_id).await;
            if let Err(cleanup) = discovery::teardown(&save_dir).await {
                warn!(%cleanup, "failed to remove save directory after failed start");
            }
            return Err(err);
        }
    };

    let actor = SessionActor {
        channel_id: request.channel_id,
        owner: request.owner.clone(),
        save_dir,
        supervisor,
        arbiter: Arbiter::new(request.owner, config.arbitration.timings()),
        tracker: SaveTracker::new(),
        compose: config.compose_options(),
        echo: false,
        banner_pending: true,
        last_activity: Arc::clone(&handle.last_activity),
        messenger,
        registry: registry.clone(),
    };
    tokio::spawn(actor.run(rx, events).instrument(span));

    Ok(handle)
}

struct SessionActor {
    channel_id: String,
    owner: Participant,
    save_dir: PathBuf,
    supervisor: Supervisor,
    arbiter: Arbiter,
    tracker: SaveTracker,
    compose: ComposeOptions,
    echo: bool,
    /// The first flush is the interpreter banner and never carries a save.
    banner_pending: bool,
    last_activity: Arc<AtomicI64>,
    messenger: Arc<dyn Messenger>,
    registry: SessionRegistry,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::Receiver<DrainEvent>,
    ) {
        info!("session started");
        let mut commands_open = true;

        loop {
            let deadline = self.arbiter.next_deadline();
            tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        commands_open = false;
                        self.force_quit();
                    }
                },
                event = events.recv() => match event {
                    Some(DrainEvent::Idle(output)) => self.flush_output(&output).await,
                    Some(DrainEvent::Exited { output, exit_code }) => {
                        self.finish(&output, exit_code).await;
                        return;
                    }
                    None => {
                        self.finish(&[], None).await;
                        return;
                    }
                },
                () = wait_for(deadline) => {
                    let effects = self.arbiter.on_deadline(Instant::now());
                    self.apply(effects).await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        let now = Instant::now();
        match command {
            SessionCommand::Input { from, text } => {
                self.last_activity
                    .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                let effects = self.arbiter.submit(&from, &text, now);
                self.apply(effects).await;
            }
            SessionCommand::SetMode {
                requester,
                mode,
                is_moderator,
            } => {
                if requester.id != self.owner.id && !is_moderator {
                    self.notify("Only the player who started the game or a moderator can change the input mode.")
                        .await;
                    return;
                }
                info!(%mode, requester = %requester.id, "input mode changed");
                let effects = self.arbiter.set_mode(mode, now);
                self.apply(effects).await;
            }
            SessionCommand::TransferDriver {
                requester,
                target,
                is_moderator,
            } => match self.arbiter.transfer_driver(&requester, target, is_moderator) {
                Ok(effects) => self.apply(effects).await,
                Err(err) => self.notify(&err.detail()).await,
            },
            SessionCommand::Join(player) => {
                let effects = self.arbiter.join(player, now);
                self.apply(effects).await;
            }
            SessionCommand::Leave(player) => {
                let effects = self.arbiter.leave(&player, now);
                self.apply(effects).await;
            }
            SessionCommand::SetIndent(indent) => {
                self.compose.indent = indent;
                self.notify(&format!("Output will skip the first {indent} column(s)."))
                    .await;
            }
            SessionCommand::ToggleEcho => {
                self.echo = !self.echo;
                let state = if self.echo { "on" } else { "off" };
                self.notify(&format!("Output logging is now {state}.")).await;
            }
            SessionCommand::ForceQuit => self.force_quit(),
        }
    }

    fn force_quit(&mut self) {
        info!("force quitting session");
        self.arbiter.cancel_timers();
        if let Err(err) = self.supervisor.terminate() {
            debug!(%err, "nothing to terminate");
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Forward(text) => {
                    if let Err(err) = self.supervisor.write_input(&text).await {
                        warn!(%err, "failed to forward input to interpreter");
                    }
                }
                Effect::Notice(text) => self.notify(&text).await,
            }
        }
    }

    /// Post composed output, attaching a newly written save to the last
    /// block, then cut the save directory down to that save.
    async fn flush_output(&mut self, output: &[u8]) {
        let blocks = compose(output, &self.compose);

        let save = if self.banner_pending {
            self.banner_pending = false;
            None
        } else {
            match discovery::scan(&self.save_dir).await {
                Ok(newest) => self.tracker.observe(newest),
                Err(err) => {
                    warn!(%err, "failed to scan save directory");
                    None
                }
            }
        };
        let mut attachment = match save {
            Some(save) => read_save(&save).await,
            None => None,
        };

        if blocks.is_empty() {
            if attachment.is_some() {
                let message = OutboundMessage::notice(&self.channel_id, SAVED_NOTICE)
                    .with_attachment(attachment.take());
                self.deliver(message).await;
            }
        } else {
            let last = blocks.len() - 1;
            for (index, block) in blocks.into_iter().enumerate() {
                let file = if index == last { attachment.take() } else { None };
                self.post_story(block, file).await;
            }
        }

        if let Err(err) = discovery::prune(&self.save_dir).await {
            warn!(%err, "failed to prune save directory");
        }
    }

    async fn finish(&mut self, output: &[u8], exit_code: Option<i32>) {
        self.arbiter.cancel_timers();
        for block in compose(output, &self.compose) {
            self.post_story(block, None).await;
        }

        let last_save = match discovery::scan(&self.save_dir).await {
            Ok(newest) => newest,
            Err(err) => {
                warn!(%err, "failed to scan save directory");
                None
            }
        };
        let attachment = match last_save {
            Some(save) => read_save(&save).await,
            None => None,
        };
        let message =
            OutboundMessage::notice(&self.channel_id, ENDED_NOTICE).with_attachment(attachment);
        self.deliver(message).await;

        if let Err(err) = discovery::teardown(&self.save_dir).await {
            warn!(%err, "failed to remove save directory");
        }
        self.registry.remove(&self.channel_id).await;
        info!(?exit_code, "session ended");
    }

    async fn post_story(&self, block: String, attachment: Option<Attachment>) {
        if self.echo {
            info!(target: "story", channel_id = %self.channel_id, "{block}");
        }
        let message =
            OutboundMessage::story(&self.channel_id, block).with_attachment(attachment);
        self.deliver(message).await;
    }

    async fn notify(&self, text: &str) {
        self.deliver(OutboundMessage::notice(&self.channel_id, text))
            .await;
    }

    async fn deliver(&self, message: OutboundMessage) {
        if let Err(err) = self.messenger.deliver(message).await {
            warn!(%err, "failed to deliver message");
        }
    }
}

async fn read_save(save: &SaveFile) -> Option<Attachment> {
    match tokio::fs::read(&save.path).await {
        Ok(data) => Some(Attachment {
            file_name: save.name.clone(),
            data,
        }),
        Err(err) => {
            warn!(file = %save.name, %err, "failed to read save file");
            None
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
