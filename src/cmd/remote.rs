//! Shortcut management: `ark remote` for submission targets and `ark alias`
//! for manifest URLs.

use anyhow::{Result, bail};
use ark::config::ArkConfig;
use ark::github::parse_repo_url;
use ark::prompt::{Prompter, TerminalPrompter};
use ark::workspace::Workspace;
use std::path::Path;

/// The one operation `ark remote` performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    Add { alias: String, url: String },
    Delete(String),
    DeleteAll,
    List,
}

impl RemoteAction {
    /// Build the action from the command-line flags; exactly one must be given.
    pub fn from_flags(
        add: Option<Vec<String>>,
        delete: Option<String>,
        delete_all: bool,
        list: bool,
    ) -> Result<Self> {
        let chosen = [add.is_some(), delete.is_some(), delete_all, list]
            .iter()
            .filter(|set| **set)
            .count();
        if chosen != 1 {
            bail!(
                "Pick exactly one operation:\n  \
                 ark remote --add MyAlias https://github.com/example-user/example-repo\n  \
                 ark remote --delete MyAlias\n  \
                 ark remote --delete-all\n  \
                 ark remote --list"
            );
        }
        if let Some(values) = add {
            let [alias, url]: [String; 2] = values
                .try_into()
                .map_err(|_| anyhow::anyhow!("Expected an alias and a URL to add"))?;
            return Ok(Self::Add { alias, url });
        }
        if let Some(alias) = delete {
            return Ok(Self::Delete(alias));
        }
        Ok(if delete_all { Self::DeleteAll } else { Self::List })
    }
}

pub fn cmd_remote(config_path: &Path, action: RemoteAction) -> Result<()> {
    let mut config = ArkConfig::load(config_path)?;
    match action {
        RemoteAction::Add { alias, url } => {
            if parse_repo_url(&alias).is_some() {
                bail!(
                    "It appears that your alias is a URL. The alias should come first:\n  \
                     ark remote --add MyAlias https://github.com/example-user/example-repo"
                );
            }
            let prompter = TerminalPrompter::new(config.core.editor.clone());
            if parse_repo_url(&url).is_none()
                && !prompter.confirm(
                    &format!("\"{url}\" does not look like a repository URL. Save it anyway?"),
                    false,
                )?
            {
                bail!("Aborting.");
            }
            if let Some(old) = config.git.remotes.get(&alias) {
                let question = format!("The alias \"{alias}\" is already mapped to {old}. Replace it?");
                if !prompter.confirm(&question, false)? {
                    bail!("Aborting.");
                }
            }
            config.git.remotes.insert(alias.clone(), url.clone());
            config.save(config_path)?;
            println!("Alias \"{alias}\" successfully mapped to {url}.");
        }
        RemoteAction::Delete(alias) => {
            if config.git.remotes.is_empty() {
                println!("No aliases are currently saved, nothing was done.");
                return Ok(());
            }
            match config.git.remotes.remove(&alias) {
                Some(old) => {
                    config.save(config_path)?;
                    println!("Alias \"{alias}\" which mapped to {old} has been deleted.");
                }
                None => println!(
                    "There are no saved remotes that go by the alias \"{alias}\". Nothing was done."
                ),
            }
        }
        RemoteAction::DeleteAll => {
            let count = config.git.remotes.len();
            config.git.remotes.clear();
            config.save(config_path)?;
            println!("{count} saved alias(es) deleted.");
        }
        RemoteAction::List => {
            let remotes = &config.git.remotes;
            if remotes.is_empty() {
                println!("No saved remote aliases.");
                return Ok(());
            }
            println!("{} saved aliases:", remotes.len());
            let width = remotes.keys().map(|a| a.len()).max().unwrap_or(0);
            for (alias, url) in remotes {
                println!("  \"{alias}\" = {:pad$}{url}", "", pad = width - alias.len());
            }
        }
    }
    Ok(())
}

/// Set (`url` given), delete (`delete`), or print a manifest shortcut. Only
/// runs inside a workspace.
pub fn cmd_alias(
    dir: &Path,
    config_path: &Path,
    shortcut: &str,
    url: Option<&str>,
    delete: bool,
) -> Result<()> {
    Workspace::open(dir)?;
    let mut config = ArkConfig::load(config_path)?;
    match (url, delete) {
        (Some(_), true) => bail!("Give either a URL to set or --delete, not both"),
        (Some(url), false) => {
            config
                .manifest
                .aliases
                .insert(shortcut.to_string(), url.to_string());
            config.save(config_path)?;
            println!("Alias \"{shortcut}\" successfully mapped to {url}.");
        }
        (None, true) => {
            if config.manifest.aliases.remove(shortcut).is_none() {
                println!("There is no alias \"{shortcut}\". Nothing was done.");
                return Ok(());
            }
            config.save(config_path)?;
            println!("Alias \"{shortcut}\" has been deleted.");
        }
        (None, false) => match config.manifest.aliases.get(shortcut) {
            Some(url) => println!("{url}"),
            None => bail!("No manifest alias named \"{shortcut}\""),
        },
    }
    Ok(())
}
