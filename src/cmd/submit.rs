//! `ark submit <url-or-alias> [-p]`

use anyhow::{Result, bail};
use ark::config;
use ark::github::GitHubClient;
use ark::prompt::TerminalPrompter;
use ark::submit::{Resolution, Submitter, cleanup};
use console::style;
use std::path::Path;

use super::{load_effective, open_locked, storage_node};

pub async fn cmd_submit(dir: &Path, config_path: &Path, target: &str, pull_request: bool) -> Result<()> {
    let ws = open_locked(dir)?;
    let config = load_effective(config_path)?;
    let host = GitHubClient::new();
    let cas = storage_node()?;
    let prompter = TerminalPrompter::new(config.core.editor.clone());
    let client_id = config::client_id().unwrap_or_default();

    let mut submitter = Submitter::new(
        &ws,
        config,
        config_path.to_path_buf(),
        &host,
        &cas,
        &prompter,
    )
    .client_id(client_id);

    let outcome = tokio::select! {
        result = submitter.run(target, pull_request) => result?,
        _ = tokio::signal::ctrl_c() => {
            cleanup(&ws);
            bail!("Interrupted; the scratch application and sources were removed");
        }
    };

    let verb = match outcome.resolution {
        Resolution::Create => "created",
        Resolution::Overwrite => "overwritten",
        Resolution::Amend => "amended",
    };
    if outcome.published {
        println!(
            "{} {} {verb} in {} on {} ({} new, {} total)",
            style("Submitted:").green().bold(),
            outcome.fragment_path,
            outcome.repository,
            outcome.branch,
            outcome.appended,
            outcome.total
        );
    }
    if let Some(pr) = &outcome.pull_request {
        println!("Pull request: {}", pr.html_url);
    }
    println!();
    println!("Run `ark upload` to seed the staged files to the cluster.");
    Ok(())
}
