//! Newline-delimited JSON bridge over stdin/stdout.
//!
//! Each stdin line is one [`InboundEvent`]. Each outbound message is written
//! to stdout as one JSON object:
//!
//! ```json
//! {"channel_id":"C1","kind":"story","text":"West of House","attachment":null}
//! ```
//!
//! Attachments are written into the outbox directory and referenced by path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::NdjsonCodec;
use super::{InboundEvent, MessageKind, Messenger, OutboundMessage};
use crate::chat::dispatcher::Dispatcher;
use crate::{AppError, Result};

#[derive(Debug, Serialize)]
struct OutboundRecord<'a> {
    channel_id: &'a str,
    kind: MessageKind,
    text: &'a str,
    attachment: Option<AttachmentRecord>,
}

#[derive(Debug, Serialize)]
struct AttachmentRecord {
    file_name: String,
    path: PathBuf,
}

/// [`Messenger`] that writes NDJSON records to a byte sink.
pub struct StdioMessenger<W> {
    writer: Mutex<W>,
    outbox_dir: PathBuf,
}

impl StdioMessenger<tokio::io::Stdout> {
    /// Messenger writing to the process's stdout.
    #[must_use]
    pub fn stdout(outbox_dir: impl Into<PathBuf>) -> Self {
        Self::new(tokio::io::stdout(), outbox_dir)
    }
}

impl<W> StdioMessenger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Messenger writing to `writer`, storing attachments under `outbox_dir`.
    pub fn new(writer: W, outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(writer),
            outbox_dir: outbox_dir.into(),
        }
    }

    /// Consume the messenger and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_record(&self, message: OutboundMessage) -> Result<()> {
        let attachment = match message.attachment {
            Some(file) => Some(AttachmentRecord {
                path: store_attachment(&self.outbox_dir, &file.file_name, &file.data).await?,
                file_name: file.file_name,
            }),
            None => None,
        };

        let record = OutboundRecord {
            channel_id: &message.channel_id,
            kind: message.kind,
            text: &message.text,
            attachment,
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|err| AppError::Delivery(format!("failed to encode message: {err}")))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|err| AppError::Delivery(format!("failed to write message: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| AppError::Delivery(format!("failed to flush message: {err}")))?;
        Ok(())
    }
}

impl<W> Messenger for StdioMessenger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn deliver(
        &self,
        message: OutboundMessage,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.write_record(message))
    }
}

/// Write attachment bytes to `<outbox>/<uuid>/<file_name>`.
async fn store_attachment(outbox_dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf> {
    // Only the final component of the name is trusted.
    let safe_name = Path::new(file_name)
        .file_name()
        .map_or_else(|| "attachment".into(), |n| n.to_owned());
    let dir = outbox_dir.join(uuid::Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| AppError::Delivery(format!("failed to create outbox entry: {err}")))?;
    let path = dir.join(safe_name);
    tokio::fs::write(&path, data)
        .await
        .map_err(|err| AppError::Delivery(format!("failed to write attachment: {err}")))?;
    Ok(path)
}

/// Parse one NDJSON line into an [`InboundEvent`].
///
/// Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns `AppError::Codec` if the line is not a valid event.
pub fn parse_inbound_line(line: &str) -> Result<Option<InboundEvent>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|err| AppError::Codec(format!("malformed event: {err}")))
}

/// Read inbound events from `input` and dispatch them until EOF or
/// cancellation.
///
/// Events are handled one at a time so that inputs for a channel reach its
/// session in arrival order. Malformed lines are logged and skipped.
///
/// # Errors
///
/// Returns `Ok(())` on EOF or cancellation; I/O errors on `input` end the
/// loop with `AppError::Io`.
pub async fn serve_stdio<R>(
    dispatcher: Arc<Dispatcher>,
    input: R,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(input, NdjsonCodec::new());
    info!("stdio bridge listening");

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stdio bridge: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        info!("stdio bridge: EOF on input");
                        break;
                    }
                    Some(Err(AppError::Codec(msg))) => {
                        warn!(error = %msg, "stdio bridge: framing error, skipping");
                    }
                    Some(Err(err)) => {
                        warn!(%err, "stdio bridge: read error, stopping");
                        return Err(err);
                    }
                    Some(Ok(line)) => match parse_inbound_line(&line) {
                        Ok(Some(event)) => {
                            if let Err(err) = dispatcher.handle(event).await {
                                warn!(%err, "failed to handle inbound event");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(%err, raw_line = %line, "stdio bridge: parse error, skipping"),
                    },
                }
            }
        }
    }

    Ok(())
}
