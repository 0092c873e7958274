//! Semantic file-change stream over a directory tree.
//!
//! Every non-excluded directory gets its own non-recursive watch, so excluded
//! trees such as `node_modules` never cost a watch descriptor. Directories
//! created (or moved in) later are registered as they appear.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kudev_core::{FileChangeEvent, FileOperation};
use kudev_hash::{relative_key, Exclusions};

use crate::error::{io_err, DaemonError};

/// Watches one root. [`watch`](Self::watch) starts a stream;
/// [`close`](Self::close) ends it. A closed stream is not resumed: call
/// `watch` again for a fresh one.
pub struct FileWatcher {
    root: PathBuf,
    exclusions: Exclusions,
    closer: Mutex<CancellationToken>,
}

impl FileWatcher {
    pub fn new(root: &Path, exclusions: Exclusions) -> Result<Self, DaemonError> {
        // Canonical so that backend paths (e.g. /private/var on macOS) strip cleanly.
        let root = fs::canonicalize(root).map_err(|e| io_err(root, e))?;
        Ok(Self {
            root,
            exclusions,
            closer: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register watches and return the event stream.
    ///
    /// The stream ends when `cancel` fires, [`close`](Self::close) is called,
    /// the notification backend shuts down, or the receiver is dropped.
    pub fn watch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<FileChangeEvent>, DaemonError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = raw_tx.send(event);
        })?;

        let mut watched = HashSet::new();
        register_tree(&mut watcher, &mut watched, &self.root, &self.root, &self.exclusions)?;
        tracing::info!(root = %self.root.display(), dirs = watched.len(), "watching source tree");

        let (tx, rx) = mpsc::channel(1);
        let task = WatchTask {
            root: self.root.clone(),
            exclusions: self.exclusions.clone(),
            watcher,
            watched,
        };
        let closed = self.closer.lock().clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = task.run(raw_rx, tx, cancel, closed).await {
                tracing::error!(error = %err, "file watcher stopped");
            }
        });
        Ok(rx)
    }

    /// End the current stream. Later `watch` calls start a new one.
    pub fn close(&self) {
        let mut closer = self.closer.lock();
        closer.cancel();
        *closer = CancellationToken::new();
    }
}

struct WatchTask {
    root: PathBuf,
    exclusions: Exclusions,
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl WatchTask {
    async fn run(
        mut self,
        mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        tx: mpsc::Sender<FileChangeEvent>,
        cancel: CancellationToken,
        closed: CancellationToken,
    ) -> Result<(), DaemonError> {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = closed.cancelled() => break,
                event = raw_rx.recv() => match event {
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                    None => break,
                },
            };

            for change in self.translate(event)? {
                tracing::trace!(path = %change.path, op = %change.operation, "file change");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = closed.cancelled() => return Ok(()),
                    sent = tx.send(change) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Filter and classify one backend event, registering any new directories.
    fn translate(&mut self, event: Event) -> Result<Vec<FileChangeEvent>, DaemonError> {
        let Some(operation) = classify(&event.kind) else {
            return Ok(Vec::new());
        };

        let mut changes = Vec::with_capacity(event.paths.len());
        for path in event.paths {
            if !path.starts_with(&self.root) {
                continue;
            }
            let rel = relative_key(&self.root, &path);
            if rel.is_empty() || self.exclusions.should_exclude(&rel) {
                continue;
            }
            // The backend drops its watch when a directory goes away, so the
            // bookkeeping must follow before a same-path directory reappears.
            if operation != FileOperation::Write {
                self.forget(&path);
            }
            let is_real_dir = std::fs::symlink_metadata(&path).is_ok_and(|m| m.is_dir());
            if matches!(operation, FileOperation::Create | FileOperation::Rename) && is_real_dir {
                register_tree(
                    &mut self.watcher,
                    &mut self.watched,
                    &self.root,
                    &path,
                    &self.exclusions,
                )?;
            }
            changes.push(FileChangeEvent::new(rel, operation));
        }
        Ok(changes)
    }

    /// Drop the watches for `path` and everything below it.
    fn forget(&mut self, path: &Path) {
        for dir in take_subtree(&mut self.watched, path) {
            // Usually already gone on the backend side.
            if let Err(err) = self.watcher.unwatch(&dir) {
                tracing::trace!(path = %dir.display(), error = %err, "unwatch");
            } else {
                tracing::debug!(path = %dir.display(), "stopped watching directory");
            }
        }
    }
}

/// Remove `path` and its descendants from `watched`, returning them.
fn take_subtree(watched: &mut HashSet<PathBuf>, path: &Path) -> Vec<PathBuf> {
    let gone: Vec<PathBuf> = watched
        .iter()
        .filter(|dir| dir.starts_with(path))
        .cloned()
        .collect();
    for dir in &gone {
        watched.remove(dir);
    }
    gone
}

/// Map a backend event kind onto the four semantic operations.
///
/// Access and metadata-only (chmod, mtime) notifications carry no content
/// change and map to `None`.
pub fn classify(kind: &EventKind) -> Option<FileOperation> {
    match kind {
        EventKind::Create(_) => Some(FileOperation::Create),
        EventKind::Remove(_) => Some(FileOperation::Delete),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileOperation::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileOperation::Write),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

fn register_tree(
    watcher: &mut RecommendedWatcher,
    watched: &mut HashSet<PathBuf>,
    root: &Path,
    start: &Path,
    exclusions: &Exclusions,
) -> Result<(), DaemonError> {
    for dir in collect_dirs(root, start, exclusions)? {
        if !watched.insert(dir.clone()) {
            continue;
        }
        match watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => tracing::debug!(path = %dir.display(), "watching directory"),
            // Removed between listing and registering.
            Err(err) if is_not_found(&err) => {
                watched.remove(&dir);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn is_not_found(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(io) => io.kind() == ErrorKind::NotFound,
        _ => false,
    }
}

/// `start` and every non-excluded directory below it.
fn collect_dirs(
    root: &Path,
    start: &Path,
    exclusions: &Exclusions,
) -> Result<Vec<PathBuf>, DaemonError> {
    let mut dirs = vec![start.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if !ty.is_dir() {
                continue;
            }
            let path = entry.path();
            if exclusions.should_exclude(&relative_key(root, &path)) {
                continue;
            }
            dirs.push(path);
        }
    }
    Ok(dirs)
}
