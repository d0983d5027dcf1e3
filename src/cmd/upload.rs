//! `ark upload [manifest]`

use anyhow::{Context, Result};
use ark::cas::CasNode;
use ark::pull::manifest_name;
use ark::ui::CountProgress;
use ark::ui::icons::UPLOAD;
use ark::upload::{UploadOptions, upload, workdir_link_path};
use std::path::Path;
use std::sync::Arc;

use super::{load_effective, open_locked, storage_node};

/// Manifest used when none is named.
const DEFAULT_MANIFEST: &str = "core";

pub async fn cmd_upload(dir: &Path, config_path: &Path, manifest: Option<&str>) -> Result<()> {
    let ws = open_locked(dir)?;
    let config = load_effective(config_path)?;
    let url = config.resolve_alias(manifest.unwrap_or(DEFAULT_MANIFEST));
    let name = manifest_name(&url)
        .with_context(|| format!("Could not derive a manifest name from '{url}'"))?;
    let link = workdir_link_path(Path::new(&config.manifest.path), &name);

    let cas: Arc<dyn CasNode> = Arc::new(storage_node()?);
    let progress = CountProgress::new(0, "Seeding");
    let report = upload(&ws, cas, &link, &UploadOptions::default(), progress).await?;

    if report.files == 0 {
        println!("No files currently staged, nothing to upload");
    } else {
        println!(
            "{UPLOAD}{} file(s) seeded as {} fingerprint(s)",
            report.files, report.fingerprints
        );
    }
    Ok(())
}
