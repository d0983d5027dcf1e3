//! `ark pull <manifest> <category/glob>...`

use anyhow::{Context, Result, bail};
use ark::git::{GitDriver, PullOutcome};
use ark::prompt::TerminalPrompter;
use ark::pull::{fetch, manifest_name, mirror_path};
use ark::ui::steady_spinner;
use std::path::Path;

use super::{load_effective, storage_node};

pub async fn cmd_pull(dir: &Path, config_path: &Path, manifest: &str, queries: &[String]) -> Result<()> {
    if queries.is_empty() {
        bail!("Name at least one file to pull, written <category>/<name>");
    }
    let config = load_effective(config_path)?;
    let url = config.resolve_alias(manifest);
    let name = manifest_name(&url)
        .with_context(|| format!("Could not derive a manifest name from '{url}'"))?;
    let mirror = mirror_path(Path::new(&config.manifest.path), &name);

    let spinner = steady_spinner(format!("Syncing the {name} manifest"));
    let sync_url = url.clone();
    let sync_path = mirror.clone();
    let synced = tokio::task::spawn_blocking(move || GitDriver::sync(&sync_url, &sync_path))
        .await
        .context("Manifest sync task failed")?;
    spinner.finish_and_clear();
    let (_, outcome) = synced?;
    match outcome {
        PullOutcome::Cloned => println!("Cloned {url}"),
        PullOutcome::FastForwarded => println!("Updated the {name} manifest"),
        PullOutcome::UpToDate => {}
    }

    let cas = storage_node()?;
    let prompter = TerminalPrompter::new(config.core.editor.clone());
    let written = fetch(&cas, &prompter, &mirror, dir, queries).await?;
    println!("{} file(s) pulled", written.len());
    Ok(())
}
