//! Look up display names in a local manifest mirror.

use super::{FRAGMENT_EXTENSION, Fragment};
use crate::errors::ManifestError;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Search the mirror at `root` for `query`, written `category/name-glob`.
///
/// Every fragment whose path ends in `<category>.ks` is read; entries whose
/// display name matches the glob are returned as `name → fingerprints`.
/// A name listed with several fingerprints keeps them in discovery order.
pub fn search(root: &Path, query: &str) -> Result<BTreeMap<String, Vec<String>>, ManifestError> {
    let (category, pattern) = match query.rsplit_once('/') {
        Some((category, pattern)) => (category.trim_matches('/'), pattern),
        None => ("", query),
    };
    let glob =
        glob::Pattern::new(pattern).map_err(|_| ManifestError::BadPattern(query.to_string()))?;
    let wanted_suffix = format!("{category}{FRAGMENT_EXTENSION}");

    let mut results: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy();
        let matches_category = if category.is_empty() {
            relative.ends_with(FRAGMENT_EXTENSION)
        } else {
            relative == wanted_suffix || relative.ends_with(&format!("/{wanted_suffix}"))
        };
        if !matches_category {
            continue;
        }

        let fragment = Fragment::load(entry.path())?;
        for item in fragment.entries() {
            if glob.matches(&item.name) {
                let fingerprints = results.entry(item.name.clone()).or_default();
                if !fingerprints.contains(&item.fingerprint) {
                    fingerprints.push(item.fingerprint.clone());
                }
            }
        }
    }
    Ok(results)
}
