//! Fetching files listed in a manifest mirror back out of the cluster.

use crate::cas::CasNode;
use crate::manifest::search;
use crate::prompt::Prompter;
use crate::ui::icons::DOWNLOAD;
use crate::ui::print_ok;
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory under `<manifest.path>/<name>/` holding the git mirror.
pub const MIRROR_DIR: &str = "manifest";

/// Name a manifest is kept under locally: the last segment of its URL.
pub fn manifest_name(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() || name.contains('@') {
        None
    } else {
        Some(name.to_string())
    }
}

/// `<manifest_root>/<name>/manifest`
pub fn mirror_path(manifest_root: &Path, name: &str) -> PathBuf {
    manifest_root.join(name).join(MIRROR_DIR)
}

/// True when `name` names a single entry directly inside a directory.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
        && Path::new(name).file_name() == Some(OsStr::new(name))
}

/// Resolve every `category/glob` query against the mirror at `mirror` and
/// write the matching files into `dest` under their display names.
///
/// A name listed with several fingerprints asks which one to fetch. Names that
/// would land outside `dest` are skipped.
pub async fn fetch(
    cas: &dyn CasNode,
    prompter: &dyn Prompter,
    mirror: &Path,
    dest: &Path,
    queries: &[String],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for query in queries {
        let results = search(mirror, query)?;
        if results.is_empty() {
            println!("Nothing in the manifest matches {query}");
            continue;
        }
        for (name, fingerprints) in results {
            if !is_plain_name(&name) {
                warn!(name = %name, "skipping manifest entry with a path in its name");
                continue;
            }
            let index = if fingerprints.len() > 1 {
                let question = format!(
                    "There is more than one file named {name}. Which version would you like to download?"
                );
                prompter.select(&question, &fingerprints, 0)?
            } else {
                0
            };
            let Some(fingerprint) = fingerprints.get(index) else {
                continue;
            };
            debug!(name = %name, fingerprint = %fingerprint, "fetching");
            let bytes = cas
                .get(fingerprint)
                .await
                .with_context(|| format!("Failed to fetch {name} ({fingerprint})"))?;
            let path = dest.join(&name);
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_ok(&format!("{DOWNLOAD}{name}"));
            written.push(path);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::AddOptions;
    use crate::cas::memory::MemoryCas;
    use crate::prompt::scripted::ScriptedPrompter;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_manifest_name_from_urls() {
        assert_eq!(
            manifest_name("https://github.com/arken/core-manifest").as_deref(),
            Some("core-manifest")
        );
        assert_eq!(
            manifest_name("https://github.com/arken/core-manifest.git/").as_deref(),
            Some("core-manifest")
        );
        assert_eq!(
            manifest_name("git@github.com:arken/science.git").as_deref(),
            Some("science")
        );
        assert_eq!(manifest_name(""), None);
    }

    #[test]
    fn test_mirror_path_layout() {
        assert_eq!(
            mirror_path(Path::new("/m"), "core"),
            PathBuf::from("/m/core/manifest")
        );
    }

    #[tokio::test]
    async fn test_fetch_writes_matching_files() {
        let mirror = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let cas = MemoryCas::new();
        let cat = cas.insert(b"meow");
        let dog = cas.insert(b"woof");
        fs::create_dir_all(mirror.path().join("pets")).unwrap();
        fs::write(
            mirror.path().join("pets/animals.ks"),
            format!("{cat}  cat.jpg\n{dog}  dog.jpg\n"),
        )
        .unwrap();
        let prompter = ScriptedPrompter::new();

        let written = fetch(
            &cas,
            &prompter,
            mirror.path(),
            dest.path(),
            &["animals/cat*".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(written, vec![dest.path().join("cat.jpg")]);
        assert_eq!(fs::read(dest.path().join("cat.jpg")).unwrap(), b"meow");
        assert!(!dest.path().join("dog.jpg").exists());
        assert!(prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_asks_between_versions() {
        let mirror = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let cas = MemoryCas::new();
        let old = cas.insert(b"v1");
        let new = cas.insert(b"v2");
        fs::write(
            mirror.path().join("docs.ks"),
            format!("{old}  notes.txt\n{new}  notes.txt\n"),
        )
        .unwrap();
        let prompter = ScriptedPrompter::new().select_with(1);

        fetch(
            &cas,
            &prompter,
            mirror.path(),
            dest.path(),
            &["docs/notes.txt".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(fs::read(dest.path().join("notes.txt")).unwrap(), b"v2");
        assert_eq!(prompter.asked().len(), 1);
    }

    #[tokio::test]
    async fn test_pulled_file_restages_to_same_fingerprint() {
        let mirror = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let cas = MemoryCas::new();
        let fp = cas.insert(b"payload");
        fs::write(mirror.path().join("data.ks"), format!("{fp}  blob.bin\n")).unwrap();

        let written = fetch(
            &cas,
            &ScriptedPrompter::new(),
            mirror.path(),
            dest.path(),
            &["data/blob.bin".to_string()],
        )
        .await
        .unwrap();

        let again = cas
            .add(&written[0], &AddOptions::fingerprint())
            .await
            .unwrap();
        assert_eq!(again, fp);
    }

    #[tokio::test]
    async fn test_fetch_skips_names_leaving_destination() {
        let root = tempdir().unwrap();
        let mirror = root.path().join("mirror");
        let dest = root.path().join("out/inner");
        fs::create_dir_all(&mirror).unwrap();
        fs::create_dir_all(&dest).unwrap();
        let cas = MemoryCas::new();
        let evil = cas.insert(b"evil");
        let good = cas.insert(b"good");
        fs::write(
            mirror.join("data.ks"),
            format!("{evil}  ../../evil.txt\n{good}  fine.txt\n"),
        )
        .unwrap();

        let written = fetch(
            &cas,
            &ScriptedPrompter::new(),
            &mirror,
            &dest,
            &["data/*".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(written, vec![dest.join("fine.txt")]);
        assert!(!root.path().join("evil.txt").exists());
    }

    #[test]
    fn test_plain_names() {
        assert!(is_plain_name("cat.jpg"));
        assert!(is_plain_name("..hidden"));
        assert!(!is_plain_name("../x"));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name("a\\b"));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name("."));
        assert!(!is_plain_name(""));
    }

    #[tokio::test]
    async fn test_fetch_missing_content_fails() {
        let mirror = tempdir().unwrap();
        let dest = tempdir().unwrap();
        fs::write(mirror.path().join("data.ks"), "bafkmissing  gone.bin\n").unwrap();

        let err = fetch(
            &MemoryCas::new(),
            &ScriptedPrompter::new(),
            mirror.path(),
            dest.path(),
            &["data/gone.bin".to_string()],
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("gone.bin"));
    }
}
