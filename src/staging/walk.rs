//! Parallel path traversal feeding the staging store, plus the `stage` and
//! `unstage` operations built on it.
//!
//! The walk is a producer-consumer pipeline: a bounded queue of directories
//! drained by a fixed set of worker threads. Workers insert regular files
//! into a [`SharedSet`] and enqueue subdirectories. Symbolic links met during
//! the walk are not followed or staged. A pending counter tracks
//! directories that are queued or being read; workers exit once it drops to
//! zero. When the queue is full a worker keeps the overflow on its own
//! stack instead of blocking, so producers that are also consumers never
//! deadlock.

use super::{BasicSet, SharedSet, StagedSet, load_file, persist};
use crate::errors::StagingError;
use crate::workspace::{ARK_DIR, LEGACY_DIR, Workspace};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// File suffixes including the leading dot, e.g. `{".jpg", ".png"}`.
pub type ExtensionSet = BTreeSet<String>;

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Parse a comma-separated extension list such as `".png,jpg,  pdf "`.
///
/// Entries are trimmed, empties dropped, and a leading dot added when missing.
pub fn parse_extensions(raw: &str) -> ExtensionSet {
    raw.split(',')
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}

/// The suffix of a file name from its last dot, e.g. `"a.tar.gz"` → `".gz"`.
pub fn suffix(name: &str) -> Option<&str> {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.rfind('.').map(|idx| &base[idx..])
}

fn matches_extension(name: &str, extensions: &ExtensionSet) -> bool {
    suffix(name).is_some_and(|ext| extensions.contains(ext))
}

fn is_hidden_dir_name(name: &str) -> bool {
    name == ARK_DIR || name == LEGACY_DIR
}

fn path_key(relative: &Path) -> String {
    relative.to_string_lossy().into_owned()
}

/// A path the user named that was not staged or unstaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    OutsideWorkspace(String),
    NotFound(String),
}

/// Store sizes before and after an operation, plus anything skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub before: usize,
    pub after: usize,
    pub skipped: Vec<Skipped>,
}

impl StageReport {
    pub fn added(&self) -> usize {
        self.after.saturating_sub(self.before)
    }

    pub fn removed(&self) -> usize {
        self.before.saturating_sub(self.after)
    }
}

/// Parallel directory walker rooted at a workspace.
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    workers: usize,
    queue_capacity: usize,
    filter: Option<ExtensionSet>,
}

impl Walker {
    pub fn new(root: &Path) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            root: root.to_path_buf(),
            workers,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            filter: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Only insert files whose suffix is in `extensions`.
    pub fn with_filter(mut self, extensions: ExtensionSet) -> Self {
        self.filter = Some(extensions);
        self
    }

    /// Insert every regular file under the workspace-relative directory
    /// `start` into `set`. Returns once every subdirectory has been read.
    pub fn walk(&self, start: &Path, set: &SharedSet) {
        let (tx, rx) = bounded::<PathBuf>(self.queue_capacity);
        let pending = AtomicUsize::new(1);
        if tx.try_send(start.to_path_buf()).is_err() {
            return;
        }

        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let tx = tx.clone();
                let rx = rx.clone();
                let pending = &pending;
                scope.spawn(move || self.worker(&tx, &rx, pending, set));
            }
        });
        debug!(start = %start.display(), staged = set.len(), "walk finished");
    }

    fn worker(
        &self,
        tx: &Sender<PathBuf>,
        rx: &Receiver<PathBuf>,
        pending: &AtomicUsize,
        set: &SharedSet,
    ) {
        let mut overflow: Vec<PathBuf> = Vec::new();
        loop {
            let dir = match overflow.pop() {
                Some(dir) => dir,
                None => match rx.recv_timeout(IDLE_POLL) {
                    Ok(dir) => dir,
                    Err(RecvTimeoutError::Timeout) => {
                        if pending.load(Ordering::SeqCst) == 0 {
                            break;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };

            for sub in self.visit(&dir, set) {
                pending.fetch_add(1, Ordering::SeqCst);
                if let Err(TrySendError::Full(sub) | TrySendError::Disconnected(sub)) =
                    tx.try_send(sub)
                {
                    overflow.push(sub);
                }
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Read one directory: insert its files, return its subdirectories.
    fn visit(&self, dir: &Path, set: &SharedSet) -> Vec<PathBuf> {
        let absolute = self.root.join(dir);
        let entries = match std::fs::read_dir(&absolute) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %absolute.display(), error = %e, "skipping unreadable directory");
                return Vec::new();
            }
        };

        let mut subdirs = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let relative = dir.join(name.as_ref());
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                debug!(path = %relative.display(), "not following symbolic link");
                continue;
            }
            if file_type.is_dir() {
                if !is_hidden_dir_name(&name) {
                    subdirs.push(relative);
                }
            } else if self
                .filter
                .as_ref()
                .is_none_or(|exts| matches_extension(&name, exts))
            {
                set.insert(path_key(&relative));
            }
        }
        subdirs
    }
}

/// Add `paths` (and, when `extensions` is non-empty, every matching file in
/// the workspace) to the staging store.
pub fn stage(
    ws: &Workspace,
    paths: &[PathBuf],
    extensions: &ExtensionSet,
) -> Result<StageReport, StagingError> {
    let store = ws.added_files_path();
    let mut set = SharedSet::new();
    load_file(&mut set, &store);
    let before = set.len();
    let walker = Walker::new(ws.root());
    let mut skipped = Vec::new();
    let real_root =
        std::fs::canonicalize(ws.root()).unwrap_or_else(|_| ws.root().to_path_buf());

    for path in paths {
        let Some(relative) = ws.relativize(path) else {
            warn!(path = %path.display(), "will not stage a path outside the workspace");
            skipped.push(Skipped::OutsideWorkspace(path.display().to_string()));
            continue;
        };
        // Named paths may pass through links; what they resolve to must
        // still be a visible part of the workspace.
        let Ok(resolved) = std::fs::canonicalize(ws.root().join(&relative)) else {
            skipped.push(Skipped::NotFound(path.display().to_string()));
            continue;
        };
        let contained = resolved
            .strip_prefix(&real_root)
            .is_ok_and(|inner| !ws.is_hidden(inner));
        if !contained {
            warn!(
                path = %path.display(),
                target = %resolved.display(),
                "will not stage a link leading outside the workspace"
            );
            skipped.push(Skipped::OutsideWorkspace(path.display().to_string()));
            continue;
        }
        if resolved.is_dir() {
            walker.walk(&relative, &set);
        } else {
            set.insert(path_key(&relative));
        }
    }

    if !extensions.is_empty() {
        walker
            .with_filter(extensions.clone())
            .walk(Path::new(""), &set);
    }

    persist(&set, &store)?;
    Ok(StageReport {
        before,
        after: set.len(),
        skipped,
    })
}

/// Remove `paths`, members matching `extensions`, or everything (`all`, or a
/// literal `.` argument) from the staging store.
pub fn unstage(
    ws: &Workspace,
    paths: &[PathBuf],
    extensions: &ExtensionSet,
    all: bool,
) -> Result<StageReport, StagingError> {
    let store = ws.added_files_path();
    let mut set = BasicSet::new();
    load_file(&mut set, &store);
    let before = set.size();
    let mut skipped = Vec::new();

    if all || paths.iter().any(|p| p == Path::new(".")) {
        set.clear();
    } else {
        for path in paths {
            match ws.relativize(path) {
                None => skipped.push(Skipped::OutsideWorkspace(path.display().to_string())),
                Some(relative) if relative.as_os_str().is_empty() => set.clear(),
                Some(relative) => {
                    set.retain(&mut |member| !Path::new(member).starts_with(&relative));
                }
            }
        }
        if !extensions.is_empty() {
            set.retain(&mut |member| !matches_extension(member, extensions));
        }
    }

    persist(&set, &store)?;
    Ok(StageReport {
        before,
        after: set.size(),
        skipped,
    })
}
