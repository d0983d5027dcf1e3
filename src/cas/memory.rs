//! In-memory [`CasNode`] for tests. Fingerprints are derived from file bytes
//! with sha2 so identical content always maps to the same fingerprint.

use super::{AddOptions, CasNode};
use crate::errors::CasError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct MemoryCas {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    added: Mutex<Vec<(PathBuf, AddOptions)>>,
    pins: Mutex<Vec<String>>,
    providers: Mutex<HashMap<String, VecDeque<usize>>>,
    lookups: Mutex<HashMap<String, usize>>,
    fail_add_for: Mutex<Option<String>>,
}

pub(crate) fn fingerprint_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("bafk{}", &hex[..32])
}

impl MemoryCas {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` directly, as if another peer had added them.
    pub(crate) fn insert(&self, bytes: &[u8]) -> String {
        let fp = fingerprint_of(bytes);
        self.blobs.lock().unwrap().insert(fp.clone(), bytes.to_vec());
        fp
    }

    /// Successive replication counts reported for `fingerprint`; the last
    /// value repeats once the script runs out.
    pub(crate) fn script_providers(&self, fingerprint: &str, counts: &[usize]) {
        self.providers
            .lock()
            .unwrap()
            .insert(fingerprint.to_string(), counts.iter().copied().collect());
    }

    /// Make `add` fail for any path containing `needle`.
    pub(crate) fn fail_add_for(&self, needle: &str) {
        *self.fail_add_for.lock().unwrap() = Some(needle.to_string());
    }

    pub(crate) fn added(&self) -> Vec<(PathBuf, AddOptions)> {
        self.added.lock().unwrap().clone()
    }

    pub(crate) fn pins(&self) -> Vec<String> {
        self.pins.lock().unwrap().clone()
    }

    pub(crate) fn lookups(&self, fingerprint: &str) -> usize {
        self.lookups
            .lock()
            .unwrap()
            .get(fingerprint)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CasNode for MemoryCas {
    async fn add(&self, path: &Path, options: &AddOptions) -> Result<String, CasError> {
        if let Some(needle) = self.fail_add_for.lock().unwrap().as_deref() {
            if path.to_string_lossy().contains(needle) {
                return Err(CasError::Unreachable("scripted failure".into()));
            }
        }
        let bytes = std::fs::read(path).map_err(|source| CasError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.added
            .lock()
            .unwrap()
            .push((path.to_path_buf(), options.clone()));
        Ok(self.insert(&bytes))
    }

    async fn get(&self, fingerprint: &str) -> Result<Vec<u8>, CasError> {
        self.blobs
            .lock()
            .unwrap()
            .get(fingerprint)
            .cloned()
            .ok_or_else(|| CasError::Status {
                code: 404,
                body: format!("no content for {fingerprint}"),
            })
    }

    async fn pin(&self, fingerprint: &str) -> Result<(), CasError> {
        self.pins.lock().unwrap().push(fingerprint.to_string());
        Ok(())
    }

    async fn find_providers(&self, fingerprint: &str, max: usize) -> Result<usize, CasError> {
        *self
            .lookups
            .lock()
            .unwrap()
            .entry(fingerprint.to_string())
            .or_default() += 1;
        let mut providers = self.providers.lock().unwrap();
        let count = match providers.get_mut(fingerprint) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(0),
            Some(script) => script.front().copied().unwrap_or(0),
            None => 0,
        };
        Ok(count.min(max))
    }
}
