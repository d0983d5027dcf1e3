//! Workspace discovery and initialization.
//!
//! A workspace is any directory holding a hidden `.ark/` directory:
//!
//! ```text
//! .ark/
//! ├── added_files      # staged paths, one per line
//! ├── submitted_files  # paths of the last successful submission, read by upload
//! ├── commit           # scratch application while submitting
//! ├── lock             # advisory lock held by the running command
//! └── sources/         # transient per-repository scratch space
//! ```
//!
//! Workspaces created by older releases use `.ait/`; they are still opened.

use crate::errors::WorkspaceError;
use fs2::FileExt;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

/// The name of the hidden workspace directory.
pub const ARK_DIR: &str = ".ark";

/// Directory name used by workspaces created before the rename.
pub const LEGACY_DIR: &str = ".ait";

pub const ADDED_FILES: &str = "added_files";
pub const SUBMITTED_FILES: &str = "submitted_files";
pub const APPLICATION_FILE: &str = "commit";
pub const SOURCES_DIR: &str = "sources";
const LOCK_FILE: &str = "lock";

/// Result of initializing a workspace.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the `.ark` directory
    pub ark_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Create `<root>/.ark`.
///
/// Succeeds without changes when the directory already exists; fails when
/// something that isn't a directory occupies the name.
pub fn init_workspace(root: &Path) -> Result<InitResult, WorkspaceError> {
    let ark_dir = root.join(ARK_DIR);

    if ark_dir.exists() || ark_dir.is_symlink() {
        if !ark_dir.is_dir() {
            return Err(WorkspaceError::NotADirectory { path: ark_dir });
        }
        return Ok(InitResult {
            ark_dir,
            created: false,
        });
    }

    std::fs::create_dir_all(&ark_dir).map_err(|source| WorkspaceError::Io {
        path: ark_dir.clone(),
        source,
    })?;
    Ok(InitResult {
        ark_dir,
        created: true,
    })
}

/// An opened workspace. Paths handed out are absolute; staged paths are
/// stored relative to [`Workspace::root`].
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    dir: PathBuf,
    lock: Option<File>,
}

impl Workspace {
    /// Open the workspace rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, WorkspaceError> {
        let root = std::path::absolute(root).map_err(|source| WorkspaceError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let dir = [ARK_DIR, LEGACY_DIR]
            .iter()
            .map(|name| root.join(name))
            .find(|candidate| candidate.is_dir())
            .ok_or_else(|| WorkspaceError::NotAWorkspace { root: root.clone() })?;

        Ok(Self {
            root: clean_path(&root),
            dir,
            lock: None,
        })
    }

    /// Take the workspace lock for the lifetime of this value.
    pub fn lock(&mut self) -> Result<(), WorkspaceError> {
        if self.lock.is_some() {
            return Ok(());
        }
        let path = self.dir.join(LOCK_FILE);
        let file = File::create(&path).map_err(|source| WorkspaceError::Io {
            path: path.clone(),
            source,
        })?;
        file.try_lock_exclusive()
            .map_err(|_| WorkspaceError::Locked)?;
        self.lock = Some(file);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The hidden `.ark` (or `.ait`) directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the hidden directory relative to the root.
    pub fn dir_name(&self) -> &str {
        self.dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(ARK_DIR)
    }

    pub fn added_files_path(&self) -> PathBuf {
        self.dir.join(ADDED_FILES)
    }

    pub fn submitted_files_path(&self) -> PathBuf {
        self.dir.join(SUBMITTED_FILES)
    }

    pub fn application_path(&self) -> PathBuf {
        self.dir.join(APPLICATION_FILE)
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.dir.join(SOURCES_DIR)
    }

    /// Convert a user-supplied path into a cleaned workspace-relative path.
    ///
    /// Relative inputs are taken relative to the root. Returns `None` when the
    /// result would escape the root or lands inside the hidden directory. The
    /// root itself maps to the empty path.
    pub fn relativize(&self, user_path: &Path) -> Option<PathBuf> {
        let absolute = if user_path.is_absolute() {
            clean_path(user_path)
        } else {
            clean_path(&self.root.join(user_path))
        };
        let relative = absolute.strip_prefix(&self.root).ok()?.to_path_buf();
        if self.is_hidden(&relative) {
            return None;
        }
        Some(relative)
    }

    /// True for the hidden workspace directory and anything below it.
    pub fn is_hidden(&self, relative: &Path) -> bool {
        matches!(
            relative.components().next(),
            Some(Component::Normal(first)) if first == ARK_DIR || first == LEGACY_DIR
        )
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component where one exists. Leading `..` on relative paths is
/// kept; `..` directly under the root is dropped.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}
