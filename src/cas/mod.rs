//! Content-addressed storage node interface.
//!
//! ark never parses fingerprints; they are opaque strings handed back by the
//! node for a file's bytes. [`KuboNode`] talks to a local node over its HTTP
//! RPC API.

pub mod kubo;

#[cfg(test)]
pub(crate) mod memory;

pub use kubo::KuboNode;

use crate::errors::CasError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Environment variable selecting the node's RPC address.
pub const API_ENV: &str = "ARK_IPFS_API";
pub const DEFAULT_API: &str = "http://127.0.0.1:5001";

/// Replication target an uploaded fingerprint must reach.
pub const DEFAULT_REPLICATION: usize = 3;

/// Upper bound on providers requested per lookup.
pub const MAX_PROVIDERS: usize = 20;

/// Private-network key shared by every node of the cluster.
pub const SWARM_KEY: &str = "/key/swarm/psk/1.0.0/\n/base16/\n\
    7c4a9e1f0b3d5a26c8e47f90a1b2d3c4e5f60718293a4b5c6d7e8f9012a3b4c5\n";

/// Options for [`CasNode::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOptions {
    /// Reference the file in place instead of copying bytes into the node's store.
    pub no_copy: bool,
    pub pin: bool,
    pub cid_version: u8,
    pub hash: &'static str,
}

impl AddOptions {
    /// The settings used for manifest fingerprints: no copy, pinned, CIDv1, sha2-256.
    pub fn fingerprint() -> Self {
        Self {
            no_copy: true,
            pin: true,
            cid_version: 1,
            hash: "sha2-256",
        }
    }
}

impl Default for AddOptions {
    fn default() -> Self {
        Self::fingerprint()
    }
}

/// The operations ark needs from a storage node.
#[async_trait]
pub trait CasNode: Send + Sync {
    /// Add the file at `path` and return its fingerprint.
    async fn add(&self, path: &Path, options: &AddOptions) -> Result<String, CasError>;

    /// Fetch the bytes behind `fingerprint`.
    async fn get(&self, fingerprint: &str) -> Result<Vec<u8>, CasError>;

    /// Pin `fingerprint` on the local node.
    async fn pin(&self, fingerprint: &str) -> Result<(), CasError>;

    /// Count peers providing `fingerprint`, looking for at most `max`.
    async fn find_providers(&self, fingerprint: &str, max: usize) -> Result<usize, CasError>;
}

/// Write [`SWARM_KEY`] to `<home>/ipfs/swarm.key` unless a key is already there.
pub fn write_swarm_key(home: &Path) -> Result<PathBuf, CasError> {
    let dir = home.join("ipfs");
    let path = dir.join("swarm.key");
    if path.exists() {
        return Ok(path);
    }
    std::fs::create_dir_all(&dir).map_err(|source| CasError::Io {
        path: dir.clone(),
        source,
    })?;
    std::fs::write(&path, SWARM_KEY).map_err(|source| CasError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
