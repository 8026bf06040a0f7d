//! Change notifications for the component directory.
//!
//! [`DirectoryWatcher::watch`] walks the root once and installs one
//! non-recursive `notify` watch per directory it finds, so directories created
//! later are not observed. Delivery is at least once and unordered; consumers
//! must tolerate duplicates. A directory whose watch cannot be installed is
//! logged and skipped while the others keep reporting.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use ignore::WalkBuilder;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{debug, info, warn};

const WATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watcher");

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    /// The file appeared.
    Created,
    /// The file's contents changed.
    Modified,
    /// The file disappeared.
    Deleted,
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        formatter.write_str(label)
    }
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Kind of change.
    pub kind: WatchEventKind,
    /// Affected path.
    pub path: PathBuf,
}

/// Errors raised while attaching the watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The root is missing or not a directory.
    #[error("cannot watch '{root}': not a directory")]
    NotADirectory {
        /// Requested root.
        root: PathBuf,
    },
    /// The platform watcher could not be created.
    #[error("failed to create file watcher: {source}")]
    Backend {
        /// Underlying notify failure.
        #[source]
        source: notify::Error,
    },
    /// A directory could not be subscribed. Logged and skipped during
    /// [`DirectoryWatcher::watch`].
    #[error("notification channel for '{directory}' unavailable: {source}")]
    NotificationChannel {
        /// Directory that was skipped.
        directory: PathBuf,
        /// Underlying notify failure.
        #[source]
        source: notify::Error,
    },
}

/// Owns the OS watch handles for one component root.
pub struct DirectoryWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    directories: Vec<PathBuf>,
}

impl DirectoryWatcher {
    /// Attaches to `root` and every directory beneath it, returning the
    /// watcher and the receiving end of its event stream. The stream ends once
    /// the watcher is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NotADirectory`] when `root` is not a directory or
    /// [`WatchError::Backend`] when no platform watcher is available.
    pub fn watch(root: &Path) -> Result<(Self, Receiver<WatchEvent>), WatchError> {
        if !root.is_dir() {
            return Err(WatchError::NotADirectory {
                root: root.to_path_buf(),
            });
        }
        let (sender, receiver) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |result| forward(&sender, result))
            .map_err(|source| WatchError::Backend { source })?;

        let mut directories = Vec::new();
        for directory in directories_under(root) {
            match watcher.watch(&directory, RecursiveMode::NonRecursive) {
                Ok(()) => directories.push(directory),
                Err(source) => {
                    let error = WatchError::NotificationChannel { directory, source };
                    warn!(target: WATCH_TARGET, %error, "directory skipped");
                }
            }
        }
        info!(
            target: WATCH_TARGET,
            root = %root.display(),
            directories = directories.len(),
            "watching component directory"
        );
        Ok((
            Self {
                root: root.to_path_buf(),
                watcher: Some(watcher),
                directories,
            },
            receiver,
        ))
    }

    /// Directories with an active watch.
    #[must_use]
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Whether the OS handles are still held.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Releases the OS handles. The event stream disconnects once the handles
    /// are gone. Stopping twice is harmless.
    pub fn stop(&mut self) {
        let Some(mut watcher) = self.watcher.take() else {
            return;
        };
        for directory in self.directories.drain(..) {
            if let Err(error) = watcher.unwatch(&directory) {
                debug!(
                    target: WATCH_TARGET,
                    directory = %directory.display(),
                    %error,
                    "unwatch failed"
                );
            }
        }
        info!(target: WATCH_TARGET, root = %self.root.display(), "watcher stopped");
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for DirectoryWatcher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("directories", &self.directories)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

fn directories_under(root: &Path) -> Vec<PathBuf> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build()
        .filter_map(|result| match result {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(target: WATCH_TARGET, %error, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_dir()))
        .map(ignore::DirEntry::into_path)
        .collect()
}

fn forward(sender: &Sender<WatchEvent>, result: notify::Result<Event>) {
    let event = match result {
        Ok(event) => event,
        Err(error) => {
            warn!(target: WATCH_TARGET, %error, "file watcher reported an error");
            return;
        }
    };
    let Some(kind) = classify(&event.kind) else {
        return;
    };
    for path in event.paths {
        // A closed receiver means the reload worker has gone; nothing to do.
        if sender.send(WatchEvent { kind, path }).is_err() {
            return;
        }
    }
}

/// Maps a raw notification onto the three reported kinds. Access and
/// metadata-only notifications are dropped.
fn classify(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Remove(_) => Some(WatchEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchEventKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(WatchEventKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}
