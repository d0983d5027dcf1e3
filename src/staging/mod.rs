//! The staging store: the set of workspace-relative paths queued for the
//! next submission, persisted one per line in `.ark/added_files`.
//!
//! Three variants share the [`StagedSet`] contract:
//! - [`BasicSet`]: hash set, single-threaded
//! - [`SharedSet`]: hash set behind a readers-writer lock, filled by the
//!   parallel walker
//! - [`SortedSet`]: ordered set, used for `status` display

pub mod walk;

pub use walk::{ExtensionSet, StageReport, parse_extensions, stage, unstage};

use crate::errors::StagingError;
use std::collections::{BTreeSet, HashSet};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Operations shared by every staging set variant.
pub trait StagedSet {
    fn contains(&self, path: &str) -> bool;

    /// Insert `path`; returns false if it was already present.
    fn add(&mut self, path: String) -> bool;

    /// Remove `path`; returns false if it wasn't present.
    fn delete(&mut self, path: &str) -> bool;

    fn size(&self) -> usize;

    /// Visit every member. `f` must not mutate the set.
    fn for_each(&self, f: &mut dyn FnMut(&str));

    /// Keep only members for which `keep` returns true.
    fn retain(&mut self, keep: &mut dyn FnMut(&str) -> bool);

    fn clear(&mut self);

    /// Read one path per line; surrounding whitespace and blank lines are ignored.
    fn load<R: BufRead>(&mut self, reader: R) -> io::Result<()>
    where
        Self: Sized,
    {
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                self.add(trimmed.to_string());
            }
        }
        Ok(())
    }

    /// Write every member followed by LF.
    fn dump<W: Write>(&self, mut writer: W) -> io::Result<()>
    where
        Self: Sized,
    {
        let mut result = Ok(());
        self.for_each(&mut |path| {
            if result.is_ok() {
                result = writeln!(writer, "{path}");
            }
        });
        result?;
        writer.flush()
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Members collected into a vector, in iteration order.
    fn to_vec(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.size());
        self.for_each(&mut |path| out.push(path.to_string()));
        out
    }
}

/// Unordered, single-threaded set.
#[derive(Debug, Default, Clone)]
pub struct BasicSet {
    inner: HashSet<String>,
}

impl BasicSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StagedSet for BasicSet {
    fn contains(&self, path: &str) -> bool {
        self.inner.contains(path)
    }

    fn add(&mut self, path: String) -> bool {
        self.inner.insert(path)
    }

    fn delete(&mut self, path: &str) -> bool {
        self.inner.remove(path)
    }

    fn size(&self) -> usize {
        self.inner.len()
    }

    fn for_each(&self, f: &mut dyn FnMut(&str)) {
        self.inner.iter().for_each(|path| f(path.as_str()));
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&str) -> bool) {
        self.inner.retain(|path| keep(path.as_str()));
    }

    fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Lexicographically ordered set.
#[derive(Debug, Default, Clone)]
pub struct SortedSet {
    inner: BTreeSet<String>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StagedSet for SortedSet {
    fn contains(&self, path: &str) -> bool {
        self.inner.contains(path)
    }

    fn add(&mut self, path: String) -> bool {
        self.inner.insert(path)
    }

    fn delete(&mut self, path: &str) -> bool {
        self.inner.remove(path)
    }

    fn size(&self) -> usize {
        self.inner.len()
    }

    fn for_each(&self, f: &mut dyn FnMut(&str)) {
        self.inner.iter().for_each(|path| f(path.as_str()));
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&str) -> bool) {
        self.inner.retain(|path| keep(path.as_str()));
    }

    fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Thread-safe set. Inherent methods take `&self` so walker threads can
/// share it through an `Arc`. `for_each` holds the read lock for the whole
/// iteration.
#[derive(Debug, Default)]
pub struct SharedSet {
    inner: RwLock<HashSet<String>>,
}

impl SharedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: String) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path)
    }

    pub fn remove(&self, path: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    pub fn has(&self, path: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StagedSet for SharedSet {
    fn contains(&self, path: &str) -> bool {
        self.has(path)
    }

    fn add(&mut self, path: String) -> bool {
        self.insert(path)
    }

    fn delete(&mut self, path: &str) -> bool {
        self.remove(path)
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn for_each(&self, f: &mut dyn FnMut(&str)) {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.iter().for_each(|path| f(path.as_str()));
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&str) -> bool) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|path| keep(path.as_str()));
    }

    fn clear(&mut self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Fill `set` from the store file at `path`.
///
/// A missing file is an empty store. Other read errors are logged and leave
/// the set with whatever was read so far.
pub fn load_file<S: StagedSet>(set: &mut S, path: &Path) {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not open staging store");
            return;
        }
    };
    if let Err(e) = set.load(BufReader::new(file)) {
        warn!(path = %path.display(), error = %e, "could not read staging store");
    }
    debug!(path = %path.display(), staged = set.size(), "loaded staging store");
}

/// Replace the store file at `path` with the contents of `set`.
///
/// Writes to a temporary file beside the target and renames it into place,
/// so a failed write leaves the previous contents intact.
pub fn persist<S: StagedSet>(set: &S, path: &Path) -> Result<(), StagingError> {
    let to_err = |source: io::Error| StagingError::Persist {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(to_err)?;
    set.dump(io::BufWriter::new(tmp.as_file_mut()))
        .map_err(to_err)?;
    tmp.persist(path).map_err(|e| to_err(e.error))?;
    debug!(path = %path.display(), staged = set.size(), "persisted staging store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn exercise_contract<S: StagedSet>(mut set: S) {
        assert!(set.is_empty());
        assert!(set.add("a.txt".into()));
        assert!(!set.add("a.txt".into()));
        assert!(set.add("sub/c.txt".into()));
        assert!(set.contains("a.txt"));
        assert_eq!(set.size(), 2);

        assert!(set.delete("a.txt"));
        assert!(!set.delete("a.txt"));
        assert_eq!(set.size(), 1);

        set.retain(&mut |p| !p.starts_with("sub/"));
        assert!(set.is_empty());

        set.add("x".into());
        set.clear();
        assert_eq!(set.size(), 0);
    }

    #[test]
    fn test_basic_set_contract() {
        exercise_contract(BasicSet::new());
    }

    #[test]
    fn test_sorted_set_contract() {
        exercise_contract(SortedSet::new());
    }

    #[test]
    fn test_shared_set_contract() {
        exercise_contract(SharedSet::new());
    }

    #[test]
    fn test_sorted_set_iterates_in_order() {
        let mut set = SortedSet::new();
        for p in ["sub/c.txt", "b.txt", "a.txt"] {
            set.add(p.into());
        }
        assert_eq!(set.to_vec(), vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_load_trims_and_skips_blank_lines() {
        let mut set = BasicSet::new();
        set.load(Cursor::new("  a.txt \n\n\nb.txt\na.txt\n")).unwrap();
        assert_eq!(set.size(), 2);
        assert!(set.contains("a.txt"));
        assert!(set.contains("b.txt"));
    }

    #[test]
    fn test_dump_writes_one_per_line_without_prologue() {
        let mut set = SortedSet::new();
        set.add("b".into());
        set.add("a".into());
        let mut out = Vec::new();
        set.dump(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_shared_set_concurrent_inserts() {
        let set = Arc::new(SharedSet::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        set.insert(format!("file-{}", (t * 50) + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // Threads overlap on half their range.
        assert_eq!(set.len(), 450);
    }

    // =========================================
    // File persistence
    // =========================================

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let mut set = BasicSet::new();
        load_file(&mut set, &dir.path().join("added_files"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("added_files");

        let mut set = BasicSet::new();
        set.add("a.txt".into());
        set.add("sub/c.txt".into());
        persist(&set, &path).unwrap();

        let mut loaded = SortedSet::new();
        load_file(&mut loaded, &path);
        assert_eq!(loaded.to_vec(), vec!["a.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_persist_truncates_previous_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("added_files");
        std::fs::write(&path, "old1\nold2\nold3\n").unwrap();

        let mut set = BasicSet::new();
        set.add("new".into());
        persist(&set, &path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_persist_empty_set_leaves_zero_byte_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("added_files");
        persist(&BasicSet::new(), &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_persist_into_missing_directory_fails_cleanly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("added_files");
        let err = persist(&BasicSet::new(), &path).unwrap_err();
        assert!(matches!(err, StagingError::Persist { .. }));
    }
}
