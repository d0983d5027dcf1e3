//! Workspace commands: `ark init`, `ark stage`, `ark unstage`, `ark status`.

use anyhow::{Result, bail};
use ark::staging::walk::Skipped;
use ark::ui::icons::WARN;
use ark::staging::{SortedSet, StageReport, StagedSet, load_file, parse_extensions, stage, unstage};
use ark::workspace::{Workspace, init_workspace};
use console::style;
use std::path::{Path, PathBuf};

use super::open_locked;

/// Paths `status` lists before summarizing the rest.
const STATUS_LIMIT: usize = 50;

pub fn cmd_init(dir: &Path) -> Result<()> {
    let result = init_workspace(dir)?;
    if result.created {
        println!("Initialized ark workspace at {}", result.ark_dir.display());
        println!();
        println!("Next steps:");
        println!("  1. Run `ark stage <files>...` to choose what to contribute");
        println!("  2. Run `ark submit <manifest>` to add them to a manifest");
        println!("  3. Run `ark upload` to seed the files to the cluster");
    } else {
        println!(
            "Ark workspace already initialized at {}",
            result.ark_dir.display()
        );
    }
    Ok(())
}

pub fn cmd_stage(dir: &Path, paths: &[PathBuf], extensions: Option<&str>) -> Result<()> {
    let extensions = extensions.map(parse_extensions).unwrap_or_default();
    if paths.is_empty() && extensions.is_empty() {
        bail!("No files were given to stage; usage: ark stage <path>... [-e ext,ext]");
    }
    let ws = open_locked(dir)?;
    let report = stage(&ws, &absolute_all(paths), &extensions)?;
    print_skipped(&report);
    println!("{} file(s) added", report.added());
    Ok(())
}

pub fn cmd_unstage(
    dir: &Path,
    paths: &[PathBuf],
    extensions: Option<&str>,
    all: bool,
) -> Result<()> {
    let extensions = extensions.map(parse_extensions).unwrap_or_default();
    if paths.is_empty() && extensions.is_empty() && !all {
        bail!("No files were given to unstage; usage: ark unstage <path>... [-e ext,ext] [--all]");
    }
    let ws = open_locked(dir)?;
    if staged(&ws).is_empty() {
        println!("No files currently staged, nothing was done");
        return Ok(());
    }
    let report = unstage(&ws, &absolute_all(paths), &extensions, all)?;
    print_skipped(&report);
    println!("{} file(s) removed", report.removed());
    Ok(())
}

pub fn cmd_status(dir: &Path) -> Result<()> {
    let ws = Workspace::open(dir)?;
    let files = staged(&ws);
    println!("{} file(s) currently staged for submission", files.len());
    for path in files.iter().take(STATUS_LIMIT) {
        println!("  {}", style(path).green());
    }
    if files.len() > STATUS_LIMIT {
        println!("  … and {} more", files.len() - STATUS_LIMIT);
    }
    Ok(())
}

fn staged(ws: &Workspace) -> Vec<String> {
    let mut set = SortedSet::new();
    load_file(&mut set, &ws.added_files_path());
    set.to_vec()
}

/// Relative arguments are taken relative to the directory the command runs in.
fn absolute_all(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()))
        .collect()
}

fn print_skipped(report: &StageReport) {
    for skipped in &report.skipped {
        let line = match skipped {
            Skipped::OutsideWorkspace(path) => format!("Skipping {path}: not inside this workspace"),
            Skipped::NotFound(path) => format!("Skipping {path}: no such file or directory"),
        };
        eprintln!("{WARN}{}", style(line).yellow());
    }
}
