//! Table of live sessions keyed by channel id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::session::{SessionCommand, SessionHandle};
use crate::{AppError, Result};

/// Poll interval while waiting for sessions to tear down.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Shared registry of running sessions. At most one per channel.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyRunning` if the channel already has one.
    pub async fn insert(&self, handle: SessionHandle) -> Result<()> {
        self.insert_bounded(handle, usize::MAX).await
    }

    /// Register a session unless `max` sessions are already live.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyRunning` if the channel already has a session.
    /// - `AppError::Config` if the concurrent session limit is reached.
    pub async fn insert_bounded(&self, handle: SessionHandle, max: usize) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&handle.channel_id) {
            return Err(AppError::AlreadyRunning(
                "a game is already running in this channel".into(),
            ));
        }
        if sessions.len() >= max {
            return Err(AppError::Config(format!(
                "concurrent session limit reached ({}/{max})",
                sessions.len()
            )));
        }
        debug!(channel_id = %handle.channel_id, "session registered");
        sessions.insert(handle.channel_id.clone(), handle);
        Ok(())
    }

    /// Remove and return the session for `channel_id`.
    pub async fn remove(&self, channel_id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.lock().await.remove(channel_id);
        if removed.is_some() {
            debug!(channel_id, "session unregistered");
        }
        removed
    }

    /// Session for `channel_id`, if one is running.
    pub async fn get(&self, channel_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(channel_id).cloned()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Snapshot of every live session.
    pub async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Force-quit every session and wait up to `grace` for them to tear
    /// down. Returns how many sessions were still registered at the end.
    pub async fn shutdown_all(&self, grace: Duration) -> usize {
        let handles = self.handles().await;
        info!(count = handles.len(), "stopping all sessions");
        for handle in handles {
            if let Err(err) = handle.send(SessionCommand::ForceQuit).await {
                debug!(channel_id = %handle.channel_id, %err, "session already stopping");
            }
        }

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let remaining = self.len().await;
            if remaining == 0 {
                return 0;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(remaining, "sessions still running after shutdown grace period");
                return remaining;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
    }
}
