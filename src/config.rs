//! User configuration stored at `~/.ark/config.toml`.
//!
//! The file has three sections:
//!
//! ```toml
//! [core]
//! editor = "nano"
//!
//! [git]
//! name = ""
//! username = ""
//! email = ""
//! token = ""
//!
//! [git.remotes]
//! mine = "https://github.com/me/manifest"
//!
//! [manifest]
//! path = "/home/me/.ark/manifest"
//!
//! [manifest.aliases]
//! core = "https://github.com/arken/core-manifest"
//! ```
//!
//! Every scalar key can be overridden with `ARK_<SECTION>_<KEY>` (for example
//! `ARK_GIT_TOKEN`). Overrides only affect the in-memory value returned by
//! [`ArkConfig::effective`] and are never written back.

use crate::errors::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory under `$HOME` holding user-level ark state.
pub const HOME_DIR: &str = ".ark";

/// Configuration file name inside [`HOME_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable holding the GitHub OAuth client identifier.
pub const CLIENT_ID_ENV: &str = "ARK_GITHUB_CLIENT_ID";

/// Scalar keys reachable through `ark config <key> [value]`.
pub const KEYS: &[&str] = &[
    "core.editor",
    "git.name",
    "git.username",
    "git.email",
    "git.token",
    "manifest.path",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreSection {
    #[serde(default = "default_editor")]
    pub editor: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GitSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
    /// Shortcuts for repository URLs accepted by `submit`.
    #[serde(default)]
    pub remotes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSection {
    /// Where local manifest mirrors are kept.
    #[serde(default = "default_manifest_path")]
    pub path: String,
    /// Shortcuts for manifest URLs accepted by `pull`, `upload` and `submit`.
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
}

/// The complete `config.toml` structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArkConfig {
    #[serde(default)]
    pub core: CoreSection,
    #[serde(default)]
    pub git: GitSection,
    #[serde(default)]
    pub manifest: ManifestSection,
}

fn default_editor() -> String {
    "nano".to_string()
}

fn default_manifest_path() -> String {
    dirs::home_dir()
        .map(|home| home.join(HOME_DIR).join("manifest"))
        .unwrap_or_else(|| PathBuf::from(HOME_DIR).join("manifest"))
        .to_string_lossy()
        .into_owned()
}

fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "core".to_string(),
        "https://github.com/arken/core-manifest".to_string(),
    )])
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            editor: default_editor(),
        }
    }
}

impl Default for ManifestSection {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
            aliases: default_aliases(),
        }
    }
}

/// `$HOME/.ark`, the user-level state directory.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(HOME_DIR))
        .ok_or(ConfigError::NoHome)
}

/// The environment variable that overrides `key`, e.g. `git.token` → `ARK_GIT_TOKEN`.
pub fn env_var_name(key: &str) -> String {
    format!("ARK_{}", key.replace('.', "_").to_uppercase())
}

/// The OAuth client id, from the environment (or `.env`) first and the
/// build environment second.
pub fn client_id() -> Option<String> {
    std::env::var(CLIENT_ID_ENV)
        .ok()
        .filter(|id| !id.is_empty())
        .or_else(|| option_env!("ARK_GITHUB_CLIENT_ID").map(str::to_string))
}

impl ArkConfig {
    /// Default location, `~/.ark/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(home_dir()?.join(CONFIG_FILE))
    }

    /// Load configuration from a TOML file, returning defaults when it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Save configuration to a TOML file, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Load the file at `path`, apply `edit`, and write it back.
    ///
    /// Always starts from the on-disk values so environment overrides never
    /// leak into the file.
    pub fn update(path: &Path, edit: impl FnOnce(&mut ArkConfig)) -> Result<ArkConfig> {
        let mut config = Self::load(path)?;
        edit(&mut config);
        config.save(path)?;
        Ok(config)
    }

    /// A copy with `ARK_<SECTION>_<KEY>` environment overrides applied.
    pub fn effective(&self) -> ArkConfig {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// A copy with overrides looked up through `lookup` (keyed by env var name).
    pub fn with_overrides(&self, lookup: impl Fn(&str) -> Option<String>) -> ArkConfig {
        let mut config = self.clone();
        for key in KEYS {
            if let Some(value) = lookup(&env_var_name(key)) {
                // KEYS only holds known keys, so set cannot fail here.
                let _ = config.set(key, &value);
            }
        }
        config
    }

    /// Read a scalar value by `section.key`.
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "core.editor" => &self.core.editor,
            "git.name" => &self.git.name,
            "git.username" => &self.git.username,
            "git.email" => &self.git.email,
            "git.token" => &self.git.token,
            "manifest.path" => &self.manifest.path,
            _ => return Err(unknown_key(key)),
        };
        Ok(value.clone())
    }

    /// Write a scalar value by `section.key`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let slot = match key {
            "core.editor" => &mut self.core.editor,
            "git.name" => &mut self.git.name,
            "git.username" => &mut self.git.username,
            "git.email" => &mut self.git.email,
            "git.token" => &mut self.git.token,
            "manifest.path" => &mut self.manifest.path,
            _ => return Err(unknown_key(key)),
        };
        *slot = value.to_string();
        Ok(())
    }

    /// Resolve a manifest or remote shortcut to its URL; anything else is returned unchanged.
    pub fn resolve_alias(&self, name: &str) -> String {
        self.git
            .remotes
            .get(name)
            .or_else(|| self.manifest.aliases.get(name))
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn manifest_root(&self) -> PathBuf {
        PathBuf::from(&self.manifest.path)
    }
}

fn unknown_key(key: &str) -> ConfigError {
    ConfigError::UnknownKey {
        key: key.to_string(),
        valid: KEYS.join(", "),
    }
}
