//! Boundary with the chat platform.
//!
//! The session engine never talks to a chat service directly. Inbound text
//! arrives as [`InboundEvent`]s; outbound story text and notices leave
//! through a [`Messenger`]. [`stdio`] provides a newline-delimited JSON
//! implementation so any chat bridge can drive the engine over pipes.

pub mod codec;
pub mod stdio;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::models::participant::Participant;
use crate::Result;

/// A chat message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InboundEvent {
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Author of the message.
    pub author: Participant,
    /// Message text.
    pub text: String,
    /// Whether the author moderates the channel.
    #[serde(default)]
    pub is_moderator: bool,
    /// Users mentioned in the message, in order.
    #[serde(default)]
    pub mentions: Vec<Participant>,
    /// Local path of a file attached to the message, already downloaded.
    #[serde(default)]
    pub attachment: Option<PathBuf>,
}

/// How an outbound message should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Text produced by the story.
    Story,
    /// Status text produced by the bot itself.
    Notice,
}

/// File sent along with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Name the file is presented under.
    pub file_name: String,
    /// File contents.
    pub data: Vec<u8>,
}

/// A message to post to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination channel.
    pub channel_id: String,
    /// Rendering hint.
    pub kind: MessageKind,
    /// Message text.
    pub text: String,
    /// Optional file.
    pub attachment: Option<Attachment>,
}

impl OutboundMessage {
    /// Story text for a channel.
    pub fn story(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            kind: MessageKind::Story,
            text: text.into(),
            attachment: None,
        }
    }

    /// Bot notice for a channel.
    pub fn notice(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            kind: MessageKind::Notice,
            text: text.into(),
            attachment: None,
        }
    }

    /// Attach a file.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Option<Attachment>) -> Self {
        self.attachment = attachment;
        self
    }
}

/// Outbound side of the chat platform.
///
/// Delivery may fail; callers log the failure and carry on.
pub trait Messenger: Send + Sync {
    /// Post `message` to its channel.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Delivery`](crate::AppError::Delivery) if the
    /// platform rejected or could not receive the message.
    fn deliver(
        &self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
