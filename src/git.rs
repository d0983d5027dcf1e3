//! Local mirrors of manifest repositories, kept with git2.

use anyhow::{Context, Result, bail};
use git2::Repository;
use git2::build::CheckoutBuilder;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Cloned,
    UpToDate,
    FastForwarded,
}

pub struct GitDriver {
    repo: Repository,
}

impl GitDriver {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)
            .with_context(|| format!("Failed to open git repository at {}", path.display()))?;
        Ok(Self { repo })
    }

    pub fn clone_from_url(url: &str, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let repo = Repository::clone(url, path)
            .with_context(|| format!("Failed to clone {url} into {}", path.display()))?;
        Ok(Self { repo })
    }

    /// Clone `url` into `path`, or fast-forward the mirror already there.
    pub fn sync(url: &str, path: &Path) -> Result<(Self, PullOutcome)> {
        if path.join(".git").is_dir() {
            let driver = Self::open(path)?;
            let outcome = driver.pull()?;
            Ok((driver, outcome))
        } else {
            Ok((Self::clone_from_url(url, path)?, PullOutcome::Cloned))
        }
    }

    /// Name of the checked-out branch (None when detached or unborn).
    fn head_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(str::to_string)
    }

    /// Fetch the current branch from `origin` and fast-forward onto it.
    pub fn pull(&self) -> Result<PullOutcome> {
        let branch = self
            .head_branch()
            .context("Mirror has no checked-out branch to pull")?;
        let mut remote = self
            .repo
            .find_remote("origin")
            .context("Mirror has no 'origin' remote")?;
        remote
            .fetch(&[branch.as_str()], None, None)
            .with_context(|| format!("Failed to fetch {branch} from origin"))?;

        let fetch_head = self.repo.find_reference("FETCH_HEAD")?;
        let incoming = self.repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            debug!(branch = %branch, "mirror already up to date");
            return Ok(PullOutcome::UpToDate);
        }
        if !analysis.is_fast_forward() {
            bail!(
                "The local mirror at {} has diverged from its remote; delete it and pull again",
                self.repo.workdir().unwrap_or(self.repo.path()).display()
            );
        }

        let refname = format!("refs/heads/{branch}");
        let mut reference = self.repo.find_reference(&refname)?;
        reference.set_target(incoming.id(), "ark: fast-forward")?;
        self.repo.set_head(&refname)?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::default().force()))?;
        debug!(branch = %branch, sha = %incoming.id(), "mirror fast-forwarded");
        Ok(PullOutcome::FastForwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn commit_file(dir: &Path, name: &str, content: &str, msg: &str) {
        let repo = Repository::open(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap();
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap();
        }
    }

    fn head_commit(dir: &Path) -> git2::Oid {
        Repository::open(dir)
            .unwrap()
            .head()
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .id()
    }

    fn upstream() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        commit_file(dir.path(), "fiction.ks", "F1  a.txt\n", "init");
        dir
    }

    #[test]
    fn test_sync_clones_then_fast_forwards() {
        let remote = upstream();
        let local = tempdir().unwrap();
        let mirror = local.path().join("core").join("manifest");
        let url = remote.path().to_string_lossy().into_owned();

        let (_, outcome) = GitDriver::sync(&url, &mirror).unwrap();
        assert_eq!(outcome, PullOutcome::Cloned);
        assert!(mirror.join("fiction.ks").exists());
        let first = head_commit(&mirror);

        let (_, outcome) = GitDriver::sync(&url, &mirror).unwrap();
        assert_eq!(outcome, PullOutcome::UpToDate);

        commit_file(remote.path(), "science.ks", "S1  b.txt\n", "more");
        let (_, outcome) = GitDriver::sync(&url, &mirror).unwrap();
        assert_eq!(outcome, PullOutcome::FastForwarded);
        assert!(mirror.join("science.ks").exists());
        assert_ne!(head_commit(&mirror), first);
        assert_eq!(head_commit(&mirror), head_commit(remote.path()));
    }

    #[test]
    fn test_head_branch_matches_upstream() {
        let remote = upstream();
        let upstream_branch = GitDriver::open(remote.path())
            .unwrap()
            .head_branch()
            .unwrap();
        let local = tempdir().unwrap();
        let driver = GitDriver::clone_from_url(
            &remote.path().to_string_lossy(),
            &local.path().join("mirror"),
        )
        .unwrap();
        assert_eq!(driver.head_branch().unwrap(), upstream_branch);
    }

    #[test]
    fn test_open_missing_repository_fails() {
        let dir = tempdir().unwrap();
        assert!(GitDriver::open(dir.path()).is_err());
    }
}
