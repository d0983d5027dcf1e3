//! Seeding submitted files into the storage cluster.
//!
//! Each file is added to the local node through a `workdir` symlink
//! that points back at the workspace, so the node references bytes in place.
//! A pool of workers then polls the routing table for every fingerprint until
//! it reaches the replication target, pinning locally whenever no provider
//! is found.

use crate::cas::{AddOptions, CasNode, DEFAULT_REPLICATION, MAX_PROVIDERS};
use crate::errors::CasError;
use crate::staging::{SortedSet, StagedSet, load_file};
use crate::ui::CountProgress;
use crate::workspace::Workspace;
use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Name of the link created inside a manifest's directory.
pub const WORKDIR_LINK: &str = "workdir";

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Providers a fingerprint needs before it counts as seeded.
    pub replication: usize,
    pub workers: usize,
    /// Pause before a fingerprint below target is checked again.
    pub recheck_delay: Duration,
    pub max_providers: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            replication: DEFAULT_REPLICATION,
            workers: cpus.saturating_sub(1).max(1),
            recheck_delay: Duration::from_secs(1),
            max_providers: MAX_PROVIDERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub files: usize,
    pub fingerprints: usize,
}

/// `<manifest_root>/<name>/workdir`
pub fn workdir_link_path(manifest_root: &Path, name: &str) -> PathBuf {
    manifest_root.join(name).join(WORKDIR_LINK)
}

/// A symlink to the workspace, removed when dropped.
#[derive(Debug)]
pub struct WorkdirLink {
    path: PathBuf,
}

impl WorkdirLink {
    /// Point `link` at `target`, replacing a stale link left by an earlier run.
    pub fn create(link: &Path, target: &Path) -> Result<Self> {
        if let Ok(meta) = std::fs::symlink_metadata(link) {
            if !meta.file_type().is_symlink() {
                bail!(
                    "{} already exists and is not a link; remove it and try again",
                    link.display()
                );
            }
            std::fs::remove_file(link)
                .with_context(|| format!("Failed to remove stale link {}", link.display()))?;
        }
        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        symlink_dir(target, link).with_context(|| {
            format!("Failed to link {} to {}", link.display(), target.display())
        })?;
        debug!(link = %link.display(), target = %target.display(), "workdir link created");
        Ok(Self {
            path: link.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkdirLink {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(link = %self.path.display(), error = %e, "failed to remove workdir link");
        }
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Paths to seed: the last submission's list, or the staging store when
/// nothing has been submitted yet.
pub fn files_to_upload(workspace: &Workspace) -> Vec<String> {
    let mut set = SortedSet::new();
    load_file(&mut set, &workspace.submitted_files_path());
    if set.is_empty() {
        load_file(&mut set, &workspace.added_files_path());
    }
    set.to_vec()
}

/// Add every file from [`files_to_upload`] through `link` and seed the
/// resulting fingerprints.
pub async fn upload(
    workspace: &Workspace,
    cas: Arc<dyn CasNode>,
    link: &Path,
    options: &UploadOptions,
    progress: CountProgress,
) -> Result<UploadReport> {
    let staged = files_to_upload(workspace);
    if staged.is_empty() {
        return Ok(UploadReport {
            files: 0,
            fingerprints: 0,
        });
    }

    let link = WorkdirLink::create(link, workspace.root())?;
    let add = AddOptions::fingerprint();
    let mut seen = HashSet::new();
    let mut fingerprints = Vec::new();
    for path in &staged {
        let fingerprint = cas
            .add(&link.path().join(path), &add)
            .await
            .with_context(|| format!("Failed to add {path}"))?;
        if seen.insert(fingerprint.clone()) {
            fingerprints.push(fingerprint);
        }
    }

    let report = UploadReport {
        files: staged.len(),
        fingerprints: fingerprints.len(),
    };
    progress.set_total(report.fingerprints as u64);
    progress.println(format!(
        "Seeding {} fingerprint(s) to {} provider(s) each",
        report.fingerprints, options.replication
    ));
    seed(cas, fingerprints, options, progress).await?;
    drop(link);
    Ok(report)
}

/// Poll until every fingerprint has `options.replication` providers.
pub async fn seed(
    cas: Arc<dyn CasNode>,
    fingerprints: Vec<String>,
    options: &UploadOptions,
    progress: CountProgress,
) -> Result<(), CasError> {
    if fingerprints.is_empty() {
        return Ok(());
    }

    // Each fingerprint is queued, checked or waiting, never two at once, so a
    // queue this size never blocks a requeue.
    let (tx, rx) = mpsc::channel::<String>(fingerprints.len());
    let remaining = Arc::new(AtomicUsize::new(fingerprints.len()));
    let done = Arc::new(Notify::new());
    for fingerprint in fingerprints {
        let _ = tx.send(fingerprint).await;
    }

    let rx = Arc::new(Mutex::new(rx));
    let mut workers = JoinSet::new();
    for id in 0..options.workers.max(1) {
        workers.spawn(worker(
            id,
            Worker {
                cas: cas.clone(),
                rx: rx.clone(),
                tx: tx.clone(),
                remaining: remaining.clone(),
                done: done.clone(),
                progress: progress.clone(),
                options: options.clone(),
            },
        ));
    }

    let result = loop {
        tokio::select! {
            _ = done.notified() => break Ok(()),
            joined = workers.join_next() => match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => break Err(e),
                Some(Err(e)) => break Err(CasError::Unreachable(format!("upload worker failed: {e}"))),
                None => break Ok(()),
            },
        }
    };
    workers.abort_all();
    if result.is_ok() {
        progress.finish("seeded");
    }
    result
}

struct Worker {
    cas: Arc<dyn CasNode>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    tx: mpsc::Sender<String>,
    remaining: Arc<AtomicUsize>,
    done: Arc<Notify>,
    progress: CountProgress,
    options: UploadOptions,
}

async fn worker(id: usize, w: Worker) -> Result<(), CasError> {
    loop {
        let next = w.rx.lock().await.recv().await;
        let Some(fingerprint) = next else {
            return Ok(());
        };

        let count = w
            .cas
            .find_providers(&fingerprint, w.options.max_providers)
            .await?;
        debug!(worker = id, fingerprint = %fingerprint, providers = count, "replication checked");

        if count >= w.options.replication {
            w.progress.advance(&fingerprint);
            if w.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                w.done.notify_one();
            }
            continue;
        }
        if count == 0 {
            w.cas.pin(&fingerprint).await?;
        }

        let tx = w.tx.clone();
        let delay = w.options.recheck_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fingerprint).await;
        });
    }
}
