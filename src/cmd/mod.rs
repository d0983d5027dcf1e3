//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled                       |
//! |-------------|----------------------------------------|
//! | `workspace` | `Init`, `Stage`, `Unstage`, `Status`   |
//! | `remote`    | `Remote`, `Alias`                      |
//! | `config`    | `Config`                               |
//! | `submit`    | `Submit`                               |
//! | `upload`    | `Upload`                               |
//! | `pull`      | `Pull`                                 |
//! | `update`    | `Update`                               |

pub mod config;
pub mod pull;
pub mod remote;
pub mod submit;
pub mod update;
pub mod upload;
pub mod workspace;

pub use config::cmd_config;
pub use pull::cmd_pull;
pub use remote::{cmd_alias, cmd_remote};
pub use submit::cmd_submit;
pub use update::cmd_update;
pub use upload::cmd_upload;
pub use workspace::{cmd_init, cmd_stage, cmd_status, cmd_unstage};

use anyhow::Result;
use ark::cas::{KuboNode, write_swarm_key};
use ark::config::{ArkConfig, home_dir};
use ark::workspace::Workspace;
use std::path::Path;

/// Open the workspace rooted at `dir` and hold its lock for the command.
pub(crate) fn open_locked(dir: &Path) -> Result<Workspace> {
    let mut ws = Workspace::open(dir)?;
    ws.lock()?;
    Ok(ws)
}

/// The configuration with `ARK_*` overrides applied.
pub(crate) fn load_effective(config_path: &Path) -> Result<ArkConfig> {
    Ok(ArkConfig::load(config_path)?.effective())
}

/// The storage node client, with the cluster swarm key in place under `~/.ark`.
pub(crate) fn storage_node() -> Result<KuboNode> {
    let key = write_swarm_key(&home_dir()?)?;
    tracing::debug!(path = %key.display(), "swarm key present");
    Ok(KuboNode::from_env())
}
