//! Interpreter process supervisor.
//!
//! Each session owns one [`Supervisor`]. Starting it prepares the save
//! directory, launches the interpreter with piped stdin/stdout and spawns a
//! background task that drains output and reports the exit. The child is
//! spawned with `kill_on_drop(true)` so a dropped task never leaks it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::drain::{run_drain, DrainEvent};
use crate::arbitration::action::{ENTER, SPACE};
use crate::config::InterpreterConfig;
use crate::saves::discovery;
use crate::saves::UPLOAD_SENTINEL;
use crate::story::encoding::encode_latin1;
use crate::{AppError, Result};

/// Capacity of the drain event channel.
const EVENT_BUFFER: usize = 32;

/// How long a terminated interpreter may take to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Build the interpreter argument list.
///
/// `<args…> -h <height> -w <width> -m -R <save_dir> [-L <restore>] <program>`
#[must_use]
pub fn interpreter_args(
    config: &InterpreterConfig,
    program_path: &Path,
    save_dir: &Path,
    restore: Option<&Path>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.args.iter().map(OsString::from).collect();
    args.push("-h".into());
    args.push(config.screen_height.to_string().into());
    args.push("-w".into());
    args.push(config.screen_width.to_string().into());
    args.push("-m".into());
    args.push("-R".into());
    args.push(save_dir.into());
    if let Some(restore) = restore {
        args.push("-L".into());
        args.push(restore.into());
    }
    args.push(program_path.into());
    args
}

/// Owns one interpreter process.
pub struct Supervisor {
    channel_id: String,
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
    started: bool,
    exited: Arc<AtomicBool>,
    terminate: CancellationToken,
}

impl Supervisor {
    /// Supervisor for the session in `channel_id`; nothing runs until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            stdin: None,
            pid: None,
            started: false,
            exited: Arc::new(AtomicBool::new(false)),
            terminate: CancellationToken::new(),
        }
    }

    /// Whether the interpreter has been started and has not exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started && !self.exited.load(Ordering::SeqCst)
    }

    /// OS process id of the interpreter, once started.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Launch the interpreter.
    ///
    /// The save directory is wiped and recreated. When `restore` is given it
    /// is copied into the directory under [`UPLOAD_SENTINEL`] and loaded at
    /// startup.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyRunning` if this supervisor was already started.
    /// - `AppError::Io` if the save directory cannot be prepared.
    /// - `AppError::Process` if the interpreter cannot be spawned.
    pub async fn start(
        &mut self,
        config: &InterpreterConfig,
        program_path: &Path,
        save_dir: &Path,
        restore: Option<&Path>,
    ) -> Result<mpsc::Receiver<DrainEvent>> {
        if self.started {
            return Err(AppError::AlreadyRunning(format!(
                "interpreter already started for channel {}",
                self.channel_id
            )));
        }

        discovery::reset(save_dir).await?;
        let staged = match restore {
            Some(source) => {
                let staged: PathBuf = save_dir.join(UPLOAD_SENTINEL);
                tokio::fs::copy(source, &staged).await?;
                Some(staged)
            }
            None => None,
        };

        let mut child = Command::new(&config.command)
            .args(interpreter_args(
                config,
                program_path,
                save_dir,
                staged.as_deref(),
            ))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::Process(format!("failed to spawn {}: {err}", config.command))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Process("interpreter stdout was not captured".into()))?;
        self.stdin = child.stdin.take();
        self.pid = child.id();
        self.started = true;

        info!(
            channel_id = %self.channel_id,
            pid = self.pid.unwrap_or(0),
            program = %program_path.display(),
            restored = staged.is_some(),
            "interpreter started"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let channel_id = self.channel_id.clone();
        let idle = config.idle_flush();
        let exited = Arc::clone(&self.exited);
        let terminate = self.terminate.clone();
        let span = info_span!("interpreter", channel_id = %self.channel_id);

        tokio::spawn(
            async move {
                let (output, exit_code) = tokio::join!(
                    run_drain(&channel_id, stdout, idle, &tx),
                    wait_for_exit(&channel_id, &mut child, &terminate),
                );
                exited.store(true, Ordering::SeqCst);
                info!(channel_id, ?exit_code, "interpreter exited");
                if tx
                    .send(DrainEvent::Exited { output, exit_code })
                    .await
                    .is_err()
                {
                    debug!(channel_id, "exit event dropped; session already gone");
                }
            }
            .instrument(span),
        );

        Ok(rx)
    }

    /// Send one line of player input.
    ///
    /// `ENTER` sends an empty line and `SPACE` a single space; anything else
    /// is sent verbatim. Text is written as Latin-1.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` if the interpreter is not running.
    /// - `AppError::Process` if the pipe write fails.
    pub async fn write_input(&mut self, text: &str) -> Result<()> {
        if !self.is_running() {
            return Err(self.not_running());
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            AppError::NotRunning(format!("no input pipe for channel {}", self.channel_id))
        })?;

        let line = match text {
            ENTER => "",
            SPACE => " ",
            other => other,
        };
        let mut bytes = encode_latin1(line);
        bytes.push(b'\n');

        stdin
            .write_all(&bytes)
            .await
            .map_err(|err| AppError::Process(format!("failed to write input: {err}")))?;
        stdin
            .flush()
            .await
            .map_err(|err| AppError::Process(format!("failed to flush input: {err}")))?;
        Ok(())
    }

    /// Ask the interpreter to exit. The drain task then reports
    /// [`DrainEvent::Exited`] as for a normal exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotRunning` if the interpreter was never started.
    /// Terminating an interpreter that already exited is a no-op.
    pub fn terminate(&mut self) -> Result<()> {
        if !self.started {
            return Err(self.not_running());
        }
        if self.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        debug!(channel_id = %self.channel_id, "terminating interpreter");
        self.stdin = None;
        self.terminate.cancel();
        Ok(())
    }

    fn not_running(&self) -> AppError {
        AppError::NotRunning(format!(
            "no interpreter running for channel {}",
            self.channel_id
        ))
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.terminate.cancel();
    }
}

/// Wait for the child to exit, signalling it when `terminate` fires.
async fn wait_for_exit(
    channel_id: &str,
    child: &mut Child,
    terminate: &CancellationToken,
) -> Option<i32> {
    let status = tokio::select! {
        status = child.wait() => status,
        () = terminate.cancelled() => {
            send_terminate(channel_id, child);
            match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(channel_id, "interpreter ignored termination; killing");
                    if let Err(err) = child.kill().await {
                        warn!(channel_id, %err, "failed to kill interpreter");
                    }
                    child.wait().await
                }
            }
        }
    };

    match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(channel_id, %err, "failed to wait for interpreter");
            None
        }
    }
}

#[cfg(unix)]
fn send_terminate(channel_id: &str, child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => {
            warn!(channel_id, %err, "SIGTERM failed; killing interpreter");
            if let Err(err) = child.start_kill() {
                warn!(channel_id, %err, "failed to kill interpreter");
            }
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(channel_id: &str, child: &mut Child) {
    if let Err(err) = child.start_kill() {
        warn!(channel_id, %err, "failed to kill interpreter");
    }
}
