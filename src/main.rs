use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

/// Environment variable holding a tracing filter, e.g. `ARK_LOG=ark=trace`.
const LOG_ENV: &str = "ARK_LOG";

#[derive(Parser)]
#[command(name = "ark")]
#[command(version, about = "Contribute datasets to an Arken cluster")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file to use instead of ~/.ark/config.toml
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize an ark workspace in the current directory
    #[command(visible_alias = "i")]
    Init,
    /// Stage files for submission
    #[command(visible_alias = "st")]
    Stage {
        paths: Vec<PathBuf>,
        /// Also stage every workspace file with one of these extensions (comma-separated)
        #[arg(short, long, value_name = "EXT,EXT")]
        extensions: Option<String>,
    },
    /// Remove files from the staged set
    #[command(visible_alias = "un")]
    Unstage {
        paths: Vec<PathBuf>,
        /// Remove every staged file with one of these extensions (comma-separated)
        #[arg(short, long, value_name = "EXT,EXT")]
        extensions: Option<String>,
        /// Remove everything
        #[arg(short, long)]
        all: bool,
    },
    /// Show the files currently staged for submission
    #[command(visible_alias = "s")]
    Status,
    /// Manage saved repository URLs used by submit
    #[command(visible_alias = "r")]
    Remote {
        /// Save ALIAS for URL
        #[arg(short, long, num_args = 2, value_names = ["ALIAS", "URL"])]
        add: Option<Vec<String>>,
        /// Delete a saved alias
        #[arg(short, long, value_name = "ALIAS")]
        delete: Option<String>,
        /// Delete every saved alias
        #[arg(long)]
        delete_all: bool,
        /// List saved aliases
        #[arg(short, long)]
        list: bool,
    },
    /// Add the staged files to a manifest repository
    Submit {
        /// Repository URL or saved alias
        target: String,
        /// Always submit through a fork and pull request
        #[arg(short = 'p', long = "pull-request")]
        pull_request: bool,
    },
    /// Seed the staged files to the cluster
    #[command(visible_alias = "up")]
    Upload {
        /// Manifest URL or alias (defaults to core)
        manifest: Option<String>,
    },
    /// Download files listed in a manifest
    #[command(visible_alias = "pl")]
    Pull {
        /// Manifest URL or alias
        manifest: String,
        /// Files to fetch, written <category>/<name-glob>
        files: Vec<String>,
    },
    /// Read, set or delete a manifest URL shortcut
    #[command(visible_alias = "a")]
    Alias {
        shortcut: String,
        url: Option<String>,
        #[arg(short, long)]
        delete: bool,
    },
    /// Read or write a configuration value, e.g. `ark config git.email me@example.com`
    #[command(visible_alias = "c")]
    Config { key: String, value: Option<String> },
    /// Update ark to the latest release
    #[command(visible_alias = "upd")]
    Update {
        /// Update without asking
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,ark=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let dir = std::env::current_dir().context("Failed to get current directory")?;
    let config_path = match cli.config_file.clone() {
        Some(path) => path,
        None => ark::config::ArkConfig::default_path()?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&dir)?,
        Commands::Stage { paths, extensions } => {
            cmd::cmd_stage(&dir, paths, extensions.as_deref())?
        }
        Commands::Unstage {
            paths,
            extensions,
            all,
        } => cmd::cmd_unstage(&dir, paths, extensions.as_deref(), *all)?,
        Commands::Status => cmd::cmd_status(&dir)?,
        Commands::Remote {
            add,
            delete,
            delete_all,
            list,
        } => {
            let action = cmd::remote::RemoteAction::from_flags(
                add.clone(),
                delete.clone(),
                *delete_all,
                *list,
            )?;
            cmd::cmd_remote(&config_path, action)?;
        }
        Commands::Submit {
            target,
            pull_request,
        } => cmd::cmd_submit(&dir, &config_path, target, *pull_request).await?,
        Commands::Upload { manifest } => {
            cmd::cmd_upload(&dir, &config_path, manifest.as_deref()).await?
        }
        Commands::Pull { manifest, files } => {
            cmd::cmd_pull(&dir, &config_path, manifest, files).await?
        }
        Commands::Alias {
            shortcut,
            url,
            delete,
        } => cmd::cmd_alias(&dir, &config_path, shortcut, url.as_deref(), *delete)?,
        Commands::Config { key, value } => {
            cmd::cmd_config(&dir, &config_path, key, value.as_deref())?
        }
        Commands::Update { yes } => cmd::cmd_update(*yes).await?,
    }

    Ok(())
}
