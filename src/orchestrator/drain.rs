//! Interpreter output drain.
//!
//! The interpreter never marks the end of a turn, so output is cut into
//! messages by silence: bytes accumulate until the pipe has been quiet for
//! the idle period, then the buffer is handed to the session.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Events emitted by a running interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainEvent {
    /// The interpreter went quiet after producing these bytes.
    Idle(Vec<u8>),
    /// The interpreter exited. `output` holds bytes read after the last
    /// idle flush.
    Exited {
        /// Trailing output.
        output: Vec<u8>,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
    },
}

/// Read `reader` until EOF, emitting [`DrainEvent::Idle`] whenever the
/// stream has been quiet for `idle` with output pending.
///
/// Returns whatever was buffered when EOF was reached. A closed event
/// channel is logged and reading continues so the pipe never backs up.
pub async fn run_drain<R>(
    channel_id: &str,
    reader: R,
    idle: Duration,
    events: &mpsc::Sender<DrainEvent>,
) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        match timeout(idle, reader.read_u8()).await {
            Ok(Ok(byte)) => buffer.push(byte),
            Ok(Err(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!(channel_id, "interpreter output closed");
                break;
            }
            Ok(Err(err)) => {
                warn!(channel_id, %err, "failed to read interpreter output");
                break;
            }
            Err(_) if buffer.is_empty() => {}
            Err(_) => {
                let chunk = std::mem::take(&mut buffer);
                if events.send(DrainEvent::Idle(chunk)).await.is_err() {
                    warn!(channel_id, "session stopped listening; discarding output");
                }
            }
        }
    }

    buffer
}
