//! Per-session save directory discovery and cleanup.
//!
//! The interpreter writes save files into the session's directory whenever a
//! player saves. Between output flushes the directory is kept down to the
//! single newest save; transcript/recording files and the upload staging file
//! are never treated as saves.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use tokio::fs;
use tracing::{debug, warn};

use crate::Result;

/// File name used to stage an uploaded save before the interpreter loads it.
pub const UPLOAD_SENTINEL: &str = "__UPLOADED__.qzl";

/// Script and recording transcripts produced by the interpreter.
static AUXILIARY: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // Literal pattern, checked by tests.
    Regex::new(r"(?i).*\.(?:rec|scr)$").unwrap()
});

/// A save file found in a session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFile {
    /// File name within the save directory.
    pub name: String,
    /// Full path to the file.
    pub path: PathBuf,
    /// Last modification time.
    pub modified: SystemTime,
}

/// Whether `name` is a transcript/recording file rather than a save.
#[must_use]
pub fn is_auxiliary(name: &str) -> bool {
    AUXILIARY.is_match(name)
}

fn is_candidate(name: &str) -> bool {
    name != UPLOAD_SENTINEL && !is_auxiliary(name)
}

/// Find the most recently modified save in `dir`.
///
/// Returns `Ok(None)` when the directory is missing or holds no saves.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory exists but cannot be listed.
pub async fn scan(dir: &Path) -> Result<Option<SaveFile>> {
    let mut newest: Option<SaveFile> = None;

    for (name, path, modified) in list_files(dir).await? {
        if !is_candidate(&name) {
            continue;
        }
        if newest.as_ref().is_none_or(|best| modified > best.modified) {
            newest = Some(SaveFile {
                name,
                path,
                modified,
            });
        }
    }

    Ok(newest)
}

/// Reduce `dir` to its single newest save.
///
/// Deletes every file older than the newest save, every transcript/recording
/// file and the upload staging file. Individual deletion failures are logged
/// and skipped.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory exists but cannot be listed.
pub async fn prune(dir: &Path) -> Result<()> {
    let files = list_files(dir).await?;
    let newest = files
        .iter()
        .filter(|(name, _, _)| is_candidate(name))
        .map(|(_, _, modified)| *modified)
        .max();

    for (name, path, modified) in files {
        let stale = match newest {
            Some(latest) => modified < latest,
            None => false,
        };
        if stale || !is_candidate(&name) {
            debug!(file = %name, "pruning save directory entry");
            if let Err(err) = fs::remove_file(&path).await {
                warn!(file = %name, %err, "failed to prune save directory entry");
            }
        }
    }

    Ok(())
}

/// Recursively remove a save directory. A missing directory is not an error.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory exists but cannot be removed.
pub async fn teardown(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Wipe any stale contents of `dir` and create it fresh.
///
/// # Errors
///
/// Returns `AppError::Io` if removal or creation fails.
pub async fn reset(dir: &Path) -> Result<()> {
    teardown(dir).await?;
    fs::create_dir_all(dir).await?;
    Ok(())
}

/// Clear leftovers from a previous run out of the saves root, creating the
/// root if needed. Returns how many stale session directories were removed.
///
/// # Errors
///
/// Returns `AppError::Io` if the root cannot be created or listed.
pub async fn wipe_root(root: &Path) -> Result<usize> {
    fs::create_dir_all(root).await?;

    let mut removed = 0;
    let mut entries = fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let outcome = if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match outcome {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), %err, "failed to remove stale save entry"),
        }
    }

    Ok(removed)
}

async fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf, SystemTime)>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(err) => {
                // The interpreter may delete a file between listing and stat.
                debug!(%err, "skipping vanished save directory entry");
                continue;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let modified = metadata.modified()?;
        files.push((name, entry.path(), modified));
    }

    Ok(files)
}

/// Remembers the last save reported for a session so the same file is not
/// announced twice.
#[derive(Debug, Default, Clone)]
pub struct SaveTracker {
    last_known: Option<String>,
}

impl SaveTracker {
    /// Create a tracker with no known save.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File name of the last reported save.
    #[must_use]
    pub fn last_known(&self) -> Option<&str> {
        self.last_known.as_deref()
    }

    /// Record the result of a [`scan`]. Returns the save only if it is new.
    pub fn observe(&mut self, newest: Option<SaveFile>) -> Option<SaveFile> {
        let save = newest?;
        if self.last_known.as_deref() == Some(save.name.as_str()) {
            return None;
        }
        self.last_known = Some(save.name.clone());
        Some(save)
    }
}
