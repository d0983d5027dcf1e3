//! The submission state machine.
//!
//! Init → Authenticate → PermissionCheck → ForkIfNeeded → CollectApplication
//! → ConflictResolve → GenerateFragment → Publish → PullRequestIfNeeded →
//! Cleanup. Every exit path, including errors, goes through [`cleanup`]; a
//! successful run also hands the staged list over to `upload`.

use crate::application::{Application, ApplicationFile, DEFAULT_TEMPLATE, validate_template};
use crate::auth::{AuthGuard, Identity};
use crate::cas::CasNode;
use crate::config::ArkConfig;
use crate::errors::{ApplicationError, HostError, SubmitError};
use crate::github::{
    FileWrite, NewPullRequest, PullRequest, RepoInfo, RepoRef, RepositoryHost, Signature, User,
    parse_repo_url,
};
use crate::manifest::{GenerateMode, generate};
use crate::prompt::Prompter;
use crate::staging::{SortedSet, StagedSet, load_file};
use crate::ui::icons::{FORK, LOCK, PAGE, PULL};
use crate::ui::print_ok;
use crate::workspace::Workspace;
use anyhow::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File an upstream may publish to replace the default application template.
pub const APPLICATION_TEMPLATE: &str = "application.md";

/// How the fragment reaches the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No fragment existed at the path.
    Create,
    /// Replace the existing fragment, updating against its revision.
    Overwrite,
    /// Merge staged entries into the existing fragment.
    Amend,
}

#[derive(Debug)]
pub struct SubmitOutcome {
    /// Repository the fragment was written to (upstream, or the fork).
    pub repository: RepoRef,
    pub branch: String,
    pub fragment_path: String,
    pub resolution: Resolution,
    pub appended: usize,
    pub total: usize,
    /// False when an amend found nothing new to write.
    pub published: bool,
    pub pull_request: Option<PullRequest>,
    pub reused_pull_request: bool,
}

/// Remove the scratch application and every transient source directory.
pub fn cleanup(workspace: &Workspace) {
    let application = workspace.application_path();
    if let Err(e) = std::fs::remove_file(&application) {
        if e.kind() != std::io::ErrorKind::NotFound {
            eprintln!(
                "Unable to remove {}; it is advisable that you delete it. ({e})",
                application.display()
            );
        }
    }
    let sources = workspace.sources_dir();
    if let Err(e) = std::fs::remove_dir_all(&sources) {
        if e.kind() != std::io::ErrorKind::NotFound {
            eprintln!(
                "Unable to remove {}; it is advisable that you delete it. ({e})",
                sources.display()
            );
        }
    }
}

/// Move the staged list to `submitted_files`, where `upload` reads it, and
/// leave the staging store empty.
pub fn retire_staged(workspace: &Workspace) -> anyhow::Result<()> {
    let staged = workspace.added_files_path();
    let submitted = workspace.submitted_files_path();
    std::fs::rename(&staged, &submitted).with_context(|| {
        format!(
            "Failed to move {} to {}",
            staged.display(),
            submitted.display()
        )
    })?;
    debug!(path = %submitted.display(), "staged files retired");
    Ok(())
}

/// Commit message for a fragment write: the title, a blank line, the body.
pub fn commit_message(title: &str, body: &str) -> String {
    if body.is_empty() {
        title.to_string()
    } else {
        format!("{title}\n\n{body}")
    }
}

pub struct Submitter<'a> {
    workspace: &'a Workspace,
    config: ArkConfig,
    config_path: PathBuf,
    host: &'a dyn RepositoryHost,
    cas: &'a dyn CasNode,
    prompter: &'a dyn Prompter,
    client_id: String,
    open_browser: bool,
    application: ApplicationFile,
    /// Revision of each remote path seen during this run.
    revisions: HashMap<String, String>,
}

impl<'a> Submitter<'a> {
    /// `config` is the effective configuration; `config_path` is where
    /// answers the user gives (name, email, token) are saved.
    pub fn new(
        workspace: &'a Workspace,
        config: ArkConfig,
        config_path: PathBuf,
        host: &'a dyn RepositoryHost,
        cas: &'a dyn CasNode,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            application: ApplicationFile::new(workspace.application_path()),
            workspace,
            config,
            config_path,
            host,
            cas,
            prompter,
            client_id: String::new(),
            open_browser: true,
            revisions: HashMap::new(),
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Submit the staged files to `target` (a URL or alias). With
    /// `force_pr` the change always goes through a fork and pull request.
    pub async fn run(&mut self, target: &str, force_pr: bool) -> Result<SubmitOutcome, SubmitError> {
        let result = self.execute(target, force_pr).await;
        cleanup(self.workspace);
        self.application.invalidate();
        self.revisions.clear();
        let outcome = result?;
        retire_staged(self.workspace)?;
        Ok(outcome)
    }

    async fn execute(&mut self, target: &str, force_pr: bool) -> Result<SubmitOutcome, SubmitError> {
        // Init
        let mut set = SortedSet::new();
        load_file(&mut set, &self.workspace.added_files_path());
        if set.is_empty() {
            return Err(SubmitError::NothingStaged);
        }
        let staged = set.to_vec();

        let url = self.config.resolve_alias(target);
        let upstream =
            parse_repo_url(&url).ok_or_else(|| SubmitError::BadRepositoryUrl(url.clone()))?;
        let upstream_info = self.upstream_info(&upstream).await?;
        debug!(repo = %upstream, default_branch = %upstream_info.default_branch, "target repository found");

        // Authenticate
        println!("{LOCK}Authenticating with the repository host");
        let mut guard = AuthGuard::new(self.host, self.prompter, self.client_id.clone())
            .with_token(Some(self.config.git.token.clone()))
            .persist_to(self.config_path.clone());
        if !self.open_browser {
            guard = guard.without_browser();
        }
        let mut identity = guard.authenticate().await?;
        let signature = self.signature(&identity.user)?;

        // PermissionCheck
        let mut pr_mode = force_pr;
        if !pr_mode {
            let mut permission = self
                .host
                .permission(&identity.token, &upstream, &identity.user.login)
                .await;
            if matches!(permission, Err(HostError::Unauthorized)) {
                guard.discard();
                identity = guard.authenticate().await?;
                permission = self
                    .host
                    .permission(&identity.token, &upstream, &identity.user.login)
                    .await;
            }
            let writable = match permission {
                Ok(level) => level.can_write(),
                Err(HostError::Forbidden) => false,
                Err(HostError::NotFound) => {
                    return Err(SubmitError::RepositoryMissing(upstream.to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            if !writable {
                let question = format!(
                    "You don't have write access to {upstream}. Submit through a fork and pull request instead?"
                );
                if !self.prompter.confirm(&question, true)? {
                    return Err(SubmitError::NoWritePermission(upstream.to_string()));
                }
                pr_mode = true;
            }
        }
        let token = identity.token.clone();

        // ForkIfNeeded
        let publish = if pr_mode {
            self.fork(&identity, &upstream).await?.repo_ref()
        } else {
            upstream.clone()
        };

        // CollectApplication + ConflictResolve
        let sources = self.workspace.sources_dir().join(&upstream.name);
        std::fs::create_dir_all(&sources)
            .with_context(|| format!("Failed to create {}", sources.display()))?;
        self.prepare_application(&token, &upstream, &sources).await?;

        let (app, branch, resolution, existing) = loop {
            let app = self.collect_application()?;
            let branch = if pr_mode {
                let branch = app.branch_name();
                self.ensure_branch(&token, &upstream_info, &publish, &branch)
                    .await?;
                branch
            } else {
                upstream_info.default_branch.clone()
            };

            let path = app.fragment_path();
            let Some(file) = self
                .host
                .download_file(&token, &publish, &path, Some(&branch))
                .await?
            else {
                break (app, branch, Resolution::Create, None);
            };
            self.revisions.insert(path.clone(), file.sha.clone());

            let choices = [
                format!("Overwrite {path}"),
                format!("Amend {path} (keep its entries, add new ones)"),
                "Rename (edit the application again)".to_string(),
                "Abort".to_string(),
            ];
            let question = format!("{path} already exists in {publish}. What would you like to do?");
            match self.prompter.select(&question, &choices, 1)? {
                0 => break (app, branch, Resolution::Overwrite, Some(file)),
                1 => break (app, branch, Resolution::Amend, Some(file)),
                2 => continue,
                _ => return Err(SubmitError::Aborted),
            }
        };
        let path = app.fragment_path();

        // GenerateFragment
        let output = sources.join(&app.filename);
        let mode = match (resolution, existing) {
            (Resolution::Amend, Some(file)) => {
                std::fs::write(&output, &file.content)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                GenerateMode::Amend
            }
            _ => GenerateMode::Overwrite,
        };
        let report = generate(self.cas, self.workspace.root(), &staged, &output, mode).await?;
        info!(appended = report.appended, total = report.total, "fragment generated");

        // Publish
        let published = if resolution == Resolution::Amend && report.appended == 0 {
            println!("Every staged file is already listed in {path}; nothing new to submit.");
            false
        } else {
            let content = std::fs::read(&output)
                .with_context(|| format!("Failed to read {}", output.display()))?;
            let message = commit_message(&app.title, &app.commit);
            let sha = self.revisions.get(&path).cloned();
            self.host
                .put_file(
                    &token,
                    &publish,
                    &FileWrite {
                        path: &path,
                        message: &message,
                        content: &content,
                        sha: sha.as_deref(),
                        branch: Some(&branch),
                        committer: Some(&signature),
                    },
                )
                .await?;
            self.revisions.remove(&path);
            print_ok(&format!("{PAGE}{path} written to {publish} ({branch})"));
            true
        };

        // PullRequestIfNeeded
        let mut pull_request = None;
        let mut reused_pull_request = false;
        if pr_mode {
            match self.host.find_open_pull(&token, &upstream, &branch).await? {
                Some(existing) => {
                    println!(
                        "{PULL}Pull request #{} is already open: {}",
                        existing.number, existing.html_url
                    );
                    reused_pull_request = true;
                    pull_request = Some(existing);
                }
                None => {
                    let head = format!("{}:{}", publish.owner, branch);
                    let body = if app.pull_request.is_empty() {
                        app.commit.as_str()
                    } else {
                        app.pull_request.as_str()
                    };
                    let request = NewPullRequest {
                        title: &app.title,
                        body,
                        head: &head,
                        base: &upstream_info.default_branch,
                    };
                    match self.host.create_pull(&token, &upstream, &request).await {
                        Ok(created) => {
                            print_ok(&format!(
                                "{PULL}Opened pull request #{}: {}",
                                created.number, created.html_url
                            ));
                            pull_request = Some(created);
                        }
                        // Nothing differs between the branch and its base.
                        Err(HostError::Status { code: 422, .. }) if !published => {
                            debug!(head = %head, "no changes to propose");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(SubmitOutcome {
            repository: publish,
            branch,
            fragment_path: path,
            resolution,
            appended: report.appended,
            total: report.total,
            published,
            pull_request,
            reused_pull_request,
        })
    }

    /// Repository metadata, asked with the resident token and then anonymously.
    async fn upstream_info(&self, upstream: &RepoRef) -> Result<RepoInfo, SubmitError> {
        let mut result = self.host.repository(&self.config.git.token, upstream).await;
        if matches!(result, Err(HostError::Unauthorized)) && !self.config.git.token.is_empty() {
            result = self.host.repository("", upstream).await;
        }
        match result {
            Ok(info) => Ok(info),
            Err(HostError::NotFound) => Err(SubmitError::RepositoryMissing(upstream.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Committer identity, asking for (and saving) whatever is missing.
    fn signature(&mut self, user: &User) -> Result<Signature, SubmitError> {
        let mut name = self.config.git.name.clone();
        if name.trim().is_empty() {
            name = self
                .prompter
                .input("Your name, as recorded on submissions", user.name.as_deref())?
                .trim()
                .to_string();
        }
        let mut email = self.config.git.email.clone();
        if email.trim().is_empty() {
            email = self
                .prompter
                .input("Your email, as recorded on submissions", user.email.as_deref())?
                .trim()
                .to_string();
        }

        let git = &self.config.git;
        if git.name != name || git.email != email || git.username != user.login {
            ArkConfig::update(&self.config_path, |cfg| {
                cfg.git.name = name.clone();
                cfg.git.email = email.clone();
                cfg.git.username = user.login.clone();
            })?;
            self.config.git.name = name.clone();
            self.config.git.email = email.clone();
            self.config.git.username = user.login.clone();
        }
        Ok(Signature { name, email })
    }

    /// Reuse the user's fork of `upstream` or create one.
    async fn fork(&self, identity: &Identity, upstream: &RepoRef) -> Result<RepoInfo, SubmitError> {
        let candidate = RepoRef::new(identity.user.login.clone(), upstream.name.clone());
        match self.host.repository(&identity.token, &candidate).await {
            Ok(info) if info.fork => {
                println!("{FORK}Using your fork {}", info.full_name);
                return Ok(info);
            }
            Ok(_) | Err(HostError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        let fork = self.host.fork(&identity.token, upstream).await?;
        print_ok(&format!("{FORK}Forked {upstream} to {}", fork.full_name));
        Ok(fork)
    }

    /// Create (or reuse) `branch` on `publish` at the upstream default branch.
    async fn ensure_branch(
        &self,
        token: &str,
        upstream: &RepoInfo,
        publish: &RepoRef,
        branch: &str,
    ) -> Result<(), SubmitError> {
        let base = self
            .host
            .branch_head(token, &upstream.repo_ref(), &upstream.default_branch)
            .await?;
        if self.host.ensure_branch(token, publish, branch, &base).await? {
            debug!(branch, repo = %publish, "branch created");
        } else {
            debug!(branch, repo = %publish, "reusing existing branch");
        }
        Ok(())
    }

    /// Seed the scratch application from the upstream's template, or the default.
    async fn prepare_application(
        &self,
        token: &str,
        upstream: &RepoRef,
        sources: &Path,
    ) -> Result<(), SubmitError> {
        let template = match self
            .host
            .download_file(token, upstream, APPLICATION_TEMPLATE, None)
            .await?
        {
            Some(file) => {
                let text = String::from_utf8_lossy(&file.content).into_owned();
                let copy = sources.join(APPLICATION_TEMPLATE);
                std::fs::write(&copy, &text)
                    .with_context(|| format!("Failed to write {}", copy.display()))?;
                validate_template(&text)?;
                text
            }
            None => DEFAULT_TEMPLATE.to_string(),
        };
        let path = self.application.path();
        std::fs::write(path, template)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Open the editor until the application has a filename, title and commit message.
    fn collect_application(&mut self) -> Result<Application, SubmitError> {
        loop {
            self.prompter.edit_file(self.application.path())?;
            self.application.invalidate();
            let question = match self.application.read() {
                Ok(app) if app.is_valid() && app.has_filename() => return Ok(app),
                Ok(_) => "The application needs a filename, a title and a commit message. Edit it again?".to_string(),
                Err(
                    e @ (ApplicationError::CategoryEscapes(_)
                    | ApplicationError::FilenameNotBase(_)),
                ) => format!("{e}. Edit it again?"),
                Err(e) => return Err(e.into()),
            };
            if !self.prompter.confirm(&question, true)? {
                return Err(SubmitError::IncompleteApplication);
            }
        }
    }
}
