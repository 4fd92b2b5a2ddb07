//! Routes inbound chat events to commands and sessions.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::{is_confirmation, usage, ChatCommand, COMMAND_HELP};
use crate::config::GlobalConfig;
use crate::errors::HeaderError;
use crate::messaging::{InboundEvent, Messenger, OutboundMessage};
use crate::models::program::{Catalog, Lookup, Program};
use crate::orchestrator::registry::SessionRegistry;
use crate::orchestrator::session::{spawn_session, SessionCommand, SessionHandle, SessionRequest};
use crate::saves::{headers_match, parse_program_image, parse_save};
use crate::{AppError, Result};

const CONFIRM_QUIT: &str = "Are you sure you want to quit?\n\
Say Y or Yes to close the program.\n\
NOTE: You will lose all unsaved progress!\n\
Send any other message to continue playing.";

const CONTINUING: &str = "Continuing game.";

const CONFIRM_EXPIRED: &str = "Message timeout expired. Continuing game.";

/// Force-quit requests awaiting a yes/no reply, keyed by channel and author.
type PendingQuits = Arc<Mutex<HashMap<(String, String), CancellationToken>>>;

/// Handles every inbound chat event for the bot.
pub struct Dispatcher {
    config: Arc<GlobalConfig>,
    catalog: Catalog,
    registry: SessionRegistry,
    messenger: Arc<dyn Messenger>,
    pending_quits: PendingQuits,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        catalog: Catalog,
        registry: SessionRegistry,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config,
            catalog,
            registry,
            messenger,
            pending_quits: PendingQuits::default(),
        }
    }

    /// Live session table.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Handle one inbound event.
    ///
    /// Failures caused by the user's request are posted back to the channel
    /// and are not errors here.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Delivery` if a reply could not be posted.
    pub async fn handle(&self, event: InboundEvent) -> Result<()> {
        let key = (event.channel_id.clone(), event.author.id.clone());
        let answered = {
            let mut pending = self.pending_quits.lock().await;
            pending.remove(&key).inspect(CancellationToken::cancel)
        };
        if answered.is_some() {
            return self.answer_force_quit(&event).await;
        }

        let Some(command) = ChatCommand::parse(&event.text, &self.config.command_prefix) else {
            return Ok(());
        };
        debug!(channel_id = %event.channel_id, user = %event.author.id, ?command, "chat command");

        match self.execute(&event, command).await {
            Ok(()) => Ok(()),
            Err(err @ AppError::Delivery(_)) => Err(err),
            Err(err) => {
                debug!(channel_id = %event.channel_id, %err, "command rejected");
                self.reply(&event, err.detail()).await
            }
        }
    }

    async fn execute(&self, event: &InboundEvent, command: ChatCommand) -> Result<()> {
        match command {
            ChatCommand::GameInput(text) => {
                let Some(session) = self.registry.get(&event.channel_id).await else {
                    // Game input with nothing running is ordinary chat.
                    return Ok(());
                };
                session
                    .send(SessionCommand::Input {
                        from: event.author.clone(),
                        text,
                    })
                    .await
            }
            ChatCommand::Play(query) => self.play(event, &query).await,
            ChatCommand::List => self.reply(event, self.list_text()).await,
            ChatCommand::Indent(indent) => {
                self.session(event)
                    .await?
                    .send(SessionCommand::SetIndent(indent))
                    .await
            }
            ChatCommand::Output => {
                self.session(event)
                    .await?
                    .send(SessionCommand::ToggleEcho)
                    .await
            }
            ChatCommand::ForceQuit => {
                self.session(event).await?;
                self.request_force_quit(event).await
            }
            ChatCommand::Mode(mode) => {
                self.session(event)
                    .await?
                    .send(SessionCommand::SetMode {
                        requester: event.author.clone(),
                        mode,
                        is_moderator: event.is_moderator,
                    })
                    .await
            }
            ChatCommand::Driver => {
                let target = event.mentions.first().cloned().ok_or_else(|| {
                    AppError::NotFound("Mention the user who should drive.".into())
                })?;
                self.session(event)
                    .await?
                    .send(SessionCommand::TransferDriver {
                        requester: event.author.clone(),
                        target,
                        is_moderator: event.is_moderator,
                    })
                    .await
            }
            ChatCommand::Join => {
                self.session(event)
                    .await?
                    .send(SessionCommand::Join(event.author.clone()))
                    .await
            }
            ChatCommand::Leave => {
                self.session(event)
                    .await?
                    .send(SessionCommand::Leave(event.author.clone()))
                    .await
            }
            ChatCommand::Help(topic) => self.reply(event, self.help_text(topic.as_deref())).await,
            ChatCommand::Usage(name) => {
                let line = usage(&self.config.command_prefix, name).unwrap_or_default();
                self.reply(event, format!("Usage: {line}")).await
            }
        }
    }

    /// Ask the author to confirm, and give up after the configured window.
    async fn request_force_quit(&self, event: &InboundEvent) -> Result<()> {
        let key = (event.channel_id.clone(), event.author.id.clone());
        let timeout = CancellationToken::new();
        if let Some(previous) = self
            .pending_quits
            .lock()
            .await
            .insert(key.clone(), timeout.clone())
        {
            previous.cancel();
        }
        debug!(channel_id = %event.channel_id, user = %event.author.id, "force quit awaiting confirmation");

        tokio::spawn(expire_force_quit(
            key,
            timeout,
            self.config.force_quit_window(),
            Arc::clone(&self.pending_quits),
            Arc::clone(&self.messenger),
        ));

        self.reply(event, CONFIRM_QUIT.into()).await
    }

    async fn answer_force_quit(&self, event: &InboundEvent) -> Result<()> {
        if !is_confirmation(&event.text, &self.config.command_prefix) {
            return self.reply(event, CONTINUING.into()).await;
        }

        match self.session(event).await {
            Ok(session) => {
                info!(channel_id = %event.channel_id, user = %event.author.id, "force quit confirmed");
                if let Err(err) = session.send(SessionCommand::ForceQuit).await {
                    debug!(%err, "session ended before force quit");
                }
                Ok(())
            }
            Err(err) => self.reply(event, err.detail()).await,
        }
    }

    async fn play(&self, event: &InboundEvent, query: &str) -> Result<()> {
        self.config.save_dir(&event.channel_id)?;

        if let Some(running) = self.registry.get(&event.channel_id).await {
            return Err(AppError::AlreadyRunning(format!(
                "This channel is currently playing \"{}\". Please try again after the story has finished.",
                running.program_name
            )));
        }

        let program = match self.catalog.lookup(query) {
            Lookup::Found(program) => program.clone(),
            Lookup::Ambiguous(names) => {
                return Err(AppError::NotFound(format!(
                    "\"{query}\" matches {} stories. Did you mean one of these?\n{}",
                    names.len(),
                    names.join("\n")
                )));
            }
            Lookup::Missing => {
                return Err(AppError::NotFound(format!(
                    "I couldn't find any stories matching \"{query}\"."
                )));
            }
        };

        if let Some(save) = &event.attachment {
            validate_restore(save, &program).await?;
        }

        let handle = spawn_session(
            SessionRequest {
                channel_id: event.channel_id.clone(),
                program: program.clone(),
                owner: event.author.clone(),
                restore: event.attachment.clone(),
            },
            &self.config,
            &self.registry,
            Arc::clone(&self.messenger),
        )
        .await?;

        info!(
            channel_id = %handle.channel_id,
            program = %handle.program_name,
            owner = %handle.owner.id,
            restored = event.attachment.is_some(),
            "story loaded"
        );
        let mut text = format!("Loaded \"{}\".", program.name);
        if let Some(url) = &program.url {
            let _ = write!(text, "\n{url}");
        }
        self.reply(event, text).await
    }

    async fn session(&self, event: &InboundEvent) -> Result<SessionHandle> {
        self.registry
            .get(&event.channel_id)
            .await
            .ok_or_else(|| AppError::NotRunning("Nothing is being played in this channel.".into()))
    }

    fn list_text(&self) -> String {
        if self.catalog.is_empty() {
            return "No stories are available.".into();
        }
        let mut text = String::from("Available stories:");
        for program in self.catalog.programs() {
            let _ = write!(text, "\n- {}", program.name);
            if let Some(author) = &program.author {
                let _ = write!(text, " by {author}");
            }
            if !program.aliases.is_empty() {
                let aliases: Vec<&str> = program.aliases.iter().map(String::as_str).collect();
                let _ = write!(text, " (also: {})", aliases.join(", "));
            }
        }
        text
    }

    fn help_text(&self, topic: Option<&str>) -> String {
        let prefix = &self.config.command_prefix;
        match topic {
            None => {
                let mut text =
                    String::from("Send game input by starting a message with \">\". Commands:");
                for (name, _, description) in COMMAND_HELP {
                    let line = usage(prefix, name).unwrap_or_default();
                    let _ = write!(text, "\n{line}  {description}");
                }
                text
            }
            Some(topic) => {
                let name = topic.trim_start_matches(prefix.as_str());
                let name = if name == "mortim" { "forcequit" } else { name };
                match COMMAND_HELP.iter().find(|(command, _, _)| *command == name) {
                    Some((_, _, description)) => {
                        let line = usage(prefix, name).unwrap_or_default();
                        format!("{line}\n{description}")
                    }
                    None => format!("No information found on \"{topic}\"."),
                }
            }
        }
    }

    async fn reply(&self, event: &InboundEvent, text: String) -> Result<()> {
        self.messenger
            .deliver(OutboundMessage::notice(&event.channel_id, text))
            .await
    }
}

async fn expire_force_quit(
    key: (String, String),
    timeout: CancellationToken,
    window: Duration,
    pending: PendingQuits,
    messenger: Arc<dyn Messenger>,
) {
    tokio::select! {
        () = timeout.cancelled() => return,
        () = tokio::time::sleep(window) => {}
    }

    {
        // Answers and newer requests cancel this token under the same lock.
        let mut pending = pending.lock().await;
        if timeout.is_cancelled() {
            return;
        }
        pending.remove(&key);
    }

    let (channel_id, _) = key;
    if let Err(err) = messenger
        .deliver(OutboundMessage::notice(channel_id, CONFIRM_EXPIRED))
        .await
    {
        warn!(%err, "failed to deliver message");
    }
}

/// Check that an uploaded save was written by `program`.
///
/// # Errors
///
/// - `AppError::Io` if either file cannot be read.
/// - `AppError::Header` if either header is malformed or they do not match.
pub async fn validate_restore(save: &Path, program: &Program) -> Result<()> {
    let save_bytes = tokio::fs::read(save).await?;
    let save_header = parse_save(&save_bytes)?;
    let program_bytes = tokio::fs::read(&program.path).await?;
    let program_header = parse_program_image(&program_bytes)?;

    if headers_match(&save_header, &program_header) {
        Ok(())
    } else {
        debug!(
            save_release = save_header.release,
            save_serial = %save_header.serial,
            program_release = program_header.release,
            program_serial = %program_header.serial,
            "save header does not match story"
        );
        Err(HeaderError::Mismatch.into())
    }
}
