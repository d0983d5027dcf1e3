//! `ark update [-y]`: replace the running binary with the latest release.

use anyhow::{Context, Result, bail};
use ark::prompt::{Prompter, TerminalPrompter};
use ark::ui::steady_spinner;
use self_update::backends::github::{ReleaseList, Update};
use self_update::cargo_crate_version;

const REPO_OWNER: &str = "arken";
const REPO_NAME: &str = "ark";

pub async fn cmd_update(yes: bool) -> Result<()> {
    let current = cargo_crate_version!();
    println!("Current version: {current}");
    if current.ends_with("-dev") {
        bail!("Cannot update a development build of ark");
    }

    let releases = tokio::task::spawn_blocking(|| {
        ReleaseList::configure()
            .repo_owner(REPO_OWNER)
            .repo_name(REPO_NAME)
            .build()?
            .fetch()
    })
    .await
    .context("Release lookup task failed")?
    .context("Failed to list releases")?;

    let Some(latest) = releases.first() else {
        println!("No releases published yet.");
        return Ok(());
    };
    println!("Latest version: {}", latest.version);
    if !self_update::version::bump_is_greater(current, &latest.version)? {
        println!("Already up to date!");
        return Ok(());
    }

    if !yes {
        let prompter = TerminalPrompter::new(String::new());
        if !prompter.confirm("Would you like to update ark to the newest version?", true)? {
            return Ok(());
        }
    }

    let spinner = steady_spinner("Updating ark...");
    let status = tokio::task::spawn_blocking(move || {
        Update::configure()
            .repo_owner(REPO_OWNER)
            .repo_name(REPO_NAME)
            .bin_name("ark")
            .current_version(current)
            .show_download_progress(false)
            .no_confirm(true)
            .build()?
            .update()
    })
    .await
    .context("Update task failed")?;
    spinner.finish_and_clear();
    let status = status.context("Failed to update")?;
    println!("Updated ark to {}", status.version());
    Ok(())
}
