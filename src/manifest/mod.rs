//! Manifest fragments (`.ks` files).
//!
//! A fragment lists one entry per line: the fingerprint, two spaces, then the
//! display name (the file's base name with whitespace runs collapsed to `-`).
//! Readers split on any whitespace and require exactly two fields.

pub mod search;

pub use search::search;

use crate::cas::{AddOptions, CasNode};
use crate::errors::ManifestError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Extension of manifest fragment files.
pub const FRAGMENT_EXTENSION: &str = ".ks";

const DELIMITER: &str = "  ";

/// One `(fingerprint, display-name)` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub fingerprint: String,
    pub name: String,
}

impl Entry {
    pub fn new(fingerprint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            name: name.into(),
        }
    }
}

/// An ordered list of entries with unique fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    entries: Vec<Entry>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse fragment text. Blank lines are skipped; any other line must have
    /// exactly two whitespace-separated fields. Repeated fingerprints keep
    /// their first occurrence.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut fragment = Self::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [fingerprint, name] = fields.as_slice() else {
                return Err(ManifestError::MalformedLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            fragment.push(Entry::new(*fingerprint, *name));
        }
        Ok(fragment)
    }

    /// Read and parse the fragment at `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Append `entry` unless its fingerprint is already listed. Returns
    /// whether it was added.
    pub fn push(&mut self, entry: Entry) -> bool {
        if self.contains_fingerprint(&entry.fingerprint) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn contains_fingerprint(&self, fingerprint: &str) -> bool {
        self.entries.iter().any(|e| e.fingerprint == fingerprint)
    }

    /// Fingerprints listed under `name`, in file order.
    pub fn fingerprints_for(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.fingerprint.as_str())
            .collect()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render in the fixed line format, LF-terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.fingerprint);
            out.push_str(DELIMITER);
            out.push_str(&entry.name);
            out.push('\n');
        }
        out
    }

    /// Atomically replace the file at `path` with the rendered fragment.
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let io_err = |source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(self.render().as_bytes()).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// The display name for a staged path: its base name with internal
/// whitespace runs replaced by a single dash.
pub fn display_name(path: &str) -> String {
    let base = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    base.split_whitespace().collect::<Vec<_>>().join("-")
}

/// How [`generate`] treats an existing fragment at the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateMode {
    /// Start from an empty fragment.
    Overwrite,
    /// Keep existing entries and append staged files with new fingerprints.
    Amend,
}

/// Counts from a [`generate`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateReport {
    /// Lines added by this run.
    pub appended: usize,
    /// Lines in the resulting fragment.
    pub total: usize,
}

/// Fingerprint every staged path (relative to `root`) through `cas` and
/// write the resulting fragment to `output`.
///
/// All fingerprints are computed before anything is written. If the node
/// fails, amend mode leaves `output` untouched and overwrite mode removes it,
/// so no partial fragment survives.
pub async fn generate(
    cas: &dyn CasNode,
    root: &Path,
    staged: &[String],
    output: &Path,
    mode: GenerateMode,
) -> Result<GenerateReport, ManifestError> {
    let mut fragment = match mode {
        GenerateMode::Amend if output.exists() => Fragment::load(output)?,
        _ => Fragment::new(),
    };

    let options = AddOptions::fingerprint();
    let mut appended = 0;
    for path in staged {
        let fingerprint = match cas.add(&root.join(path), &options).await {
            Ok(fp) => fp,
            Err(e) => {
                if mode == GenerateMode::Overwrite {
                    let _ = std::fs::remove_file(output);
                }
                return Err(e.into());
            }
        };
        if fragment.push(Entry::new(fingerprint, display_name(path))) {
            appended += 1;
        } else {
            debug!(path = %path, "fingerprint already listed");
        }
    }

    fragment.write(output)?;
    Ok(GenerateReport {
        appended,
        total: fragment.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::memory::{MemoryCas, fingerprint_of};
    use crate::errors::CasError;
    use tempfile::tempdir;

    // =========================================
    // Fragment parsing
    // =========================================

    #[test]
    fn test_parse_and_render() {
        let text = "bafyA  cat.jpg\n\nbafyB\tdog.png\n";
        let fragment = Fragment::parse(text).unwrap();
        assert_eq!(fragment.len(), 2);
        assert_eq!(fragment.entries()[1], Entry::new("bafyB", "dog.png"));
        assert_eq!(fragment.render(), "bafyA  cat.jpg\nbafyB  dog.png\n");
    }

    #[test]
    fn test_parse_single_field_is_malformed() {
        let err = Fragment::parse("bafyA  a\nlonely\n").unwrap_err();
        match err {
            ManifestError::MalformedLine { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "lonely");
            }
            other => panic!("Expected MalformedLine, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_three_fields_is_malformed() {
        assert!(matches!(
            Fragment::parse("bafyA  my file.txt\n"),
            Err(ManifestError::MalformedLine { line: 1, .. })
        ));
    }

    #[test]
    fn test_push_rejects_duplicate_fingerprint_but_allows_duplicate_name() {
        let mut fragment = Fragment::new();
        assert!(fragment.push(Entry::new("F1", "a.txt")));
        assert!(!fragment.push(Entry::new("F1", "renamed.txt")));
        assert!(fragment.push(Entry::new("F2", "a.txt")));
        assert_eq!(fragment.fingerprints_for("a.txt"), vec!["F1", "F2"]);
    }

    #[test]
    fn test_display_name_collapses_whitespace() {
        assert_eq!(display_name("sub/my  summer\tphoto.jpg"), "my-summer-photo.jpg");
        assert_eq!(display_name("plain.txt"), "plain.txt");
    }

    // =========================================
    // generate
    // =========================================

    fn write_files(root: &Path, files: &[(&str, &str)]) -> Vec<String> {
        for (name, body) in files {
            let path = root.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        files.iter().map(|(name, _)| name.to_string()).collect()
    }

    #[tokio::test]
    async fn test_overwrite_lists_every_staged_fingerprint() {
        let dir = tempdir().unwrap();
        let staged = write_files(dir.path(), &[("a.txt", "alpha"), ("sub/b c.txt", "beta")]);
        let output = dir.path().join("out").join("frag.ks");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, "stale  entry\n").unwrap();

        let cas = MemoryCas::new();
        let report = generate(&cas, dir.path(), &staged, &output, GenerateMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(report, GenerateReport { appended: 2, total: 2 });

        let fragment = Fragment::load(&output).unwrap();
        let mut got: Vec<&str> = fragment
            .entries()
            .iter()
            .map(|e| e.fingerprint.as_str())
            .collect();
        got.sort();
        let mut want = vec![fingerprint_of(b"alpha"), fingerprint_of(b"beta")];
        want.sort();
        assert_eq!(got, want);
        assert!(fragment.entries().iter().any(|e| e.name == "b-c.txt"));

        assert!(cas.added().iter().all(|(_, opts)| *opts == AddOptions::fingerprint()));
    }

    #[tokio::test]
    async fn test_amend_keeps_existing_names_and_appends_new() {
        let dir = tempdir().unwrap();
        let staged = write_files(dir.path(), &[("one.txt", "first"), ("two.txt", "second")]);
        let f1 = fingerprint_of(b"first");
        let f2 = fingerprint_of(b"second");
        let output = dir.path().join("frag.ks");
        std::fs::write(&output, format!("{f1}  name1\n")).unwrap();

        let cas = MemoryCas::new();
        let report = generate(&cas, dir.path(), &staged, &output, GenerateMode::Amend)
            .await
            .unwrap();
        assert_eq!(report.appended, 1);

        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text, format!("{f1}  name1\n{f2}  two.txt\n"));
    }

    #[tokio::test]
    async fn test_amend_twice_is_byte_identical() {
        let dir = tempdir().unwrap();
        let staged = write_files(dir.path(), &[("a", "1"), ("b", "2"), ("c", "3")]);
        let output = dir.path().join("frag.ks");
        let cas = MemoryCas::new();

        generate(&cas, dir.path(), &staged, &output, GenerateMode::Amend)
            .await
            .unwrap();
        let first = std::fs::read(&output).unwrap();

        let report = generate(&cas, dir.path(), &staged, &output, GenerateMode::Amend)
            .await
            .unwrap();
        assert_eq!(report.appended, 0);
        assert_eq!(std::fs::read(&output).unwrap(), first);
    }

    #[tokio::test]
    async fn test_overwrite_failure_removes_output() {
        let dir = tempdir().unwrap();
        let staged = write_files(dir.path(), &[("ok.txt", "x"), ("bad.txt", "y")]);
        let output = dir.path().join("frag.ks");
        std::fs::write(&output, "old  entry\n").unwrap();

        let cas = MemoryCas::new();
        cas.fail_add_for("bad.txt");
        let err = generate(&cas, dir.path(), &staged, &output, GenerateMode::Overwrite)
            .await
            .unwrap_err();

        assert!(matches!(err, ManifestError::Cas(CasError::Unreachable(_))));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_amend_failure_leaves_existing_fragment() {
        let dir = tempdir().unwrap();
        let staged = write_files(dir.path(), &[("bad.txt", "y")]);
        let output = dir.path().join("frag.ks");
        std::fs::write(&output, "old  entry\n").unwrap();

        let cas = MemoryCas::new();
        cas.fail_add_for("bad.txt");
        assert!(
            generate(&cas, dir.path(), &staged, &output, GenerateMode::Amend)
                .await
                .is_err()
        );
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "old  entry\n");
    }

    #[tokio::test]
    async fn test_amend_with_malformed_existing_fragment_fails() {
        let dir = tempdir().unwrap();
        let staged = write_files(dir.path(), &[("a.txt", "x")]);
        let output = dir.path().join("frag.ks");
        std::fs::write(&output, "one two three\n").unwrap();

        let cas = MemoryCas::new();
        let err = generate(&cas, dir.path(), &staged, &output, GenerateMode::Amend)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::MalformedLine { .. }));
    }
}
