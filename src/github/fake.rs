//! In-memory [`RepositoryHost`] for tests. Repositories, branches and files
//! live in a single mutex-guarded [`State`] that tests seed and inspect.

use super::{
    DeviceCode, FileWrite, NewPullRequest, Permission, PullRequest, RemoteFile, RepoInfo,
    RepoRef, RepositoryHost, TokenResponse, User,
};
use crate::errors::HostError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

type FileKey = (String, String, String);

#[derive(Default)]
pub(crate) struct State {
    pub device_codes: VecDeque<DeviceCode>,
    pub device_requests: usize,
    pub polls: VecDeque<TokenResponse>,
    pub poll_times: Vec<Instant>,
    /// token → account
    pub users: HashMap<String, User>,
    /// `owner/name` → metadata
    pub repos: HashMap<String, RepoInfo>,
    /// `owner/name` → permission or HTTP status to fail with
    pub permissions: HashMap<String, Result<Permission, u16>>,
    /// One-shot answers consumed before `permissions` is consulted.
    pub permission_queue: VecDeque<Result<Permission, u16>>,
    pub permission_checks: usize,
    /// (repo, branch, path) → file
    pub files: HashMap<FileKey, RemoteFile>,
    /// repo → branch → head sha
    pub branches: HashMap<String, BTreeMap<String, String>>,
    pub forks_created: usize,
    pub pulls: Vec<(String, String, String, String)>,
    /// head branch → open pull request
    pub open_pulls: HashMap<String, PullRequest>,
    /// Mutating calls, in order.
    pub log: Vec<String>,
    next_sha: usize,
}

impl State {
    fn fresh_sha(&mut self) -> String {
        self.next_sha += 1;
        format!("sha-{}", self.next_sha)
    }

    fn branch_of(&self, repo: &RepoRef, branch: Option<&str>) -> Result<String, HostError> {
        match branch {
            Some(b) => Ok(b.to_string()),
            None => self
                .repos
                .get(&repo.to_string())
                .map(|r| r.default_branch.clone())
                .ok_or(HostError::NotFound),
        }
    }

    fn copy_files(&mut self, from: (&str, &str), to: (&str, &str)) {
        let copies: Vec<(FileKey, RemoteFile)> = self
            .files
            .iter()
            .filter(|((r, b, _), _)| r == from.0 && b == from.1)
            .map(|((_, _, p), f)| ((to.0.to_string(), to.1.to_string(), p.clone()), f.clone()))
            .collect();
        self.files.extend(copies);
    }
}

#[derive(Default)]
pub(crate) struct FakeHost {
    state: Mutex<State>,
}

impl FakeHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn with_user(self, token: &str, login: &str) -> Self {
        self.state().users.insert(
            token.to_string(),
            User {
                login: login.to_string(),
                name: Some(format!("{login} name")),
                email: Some(format!("{login}@example.com")),
            },
        );
        self
    }

    pub(crate) fn with_repo(self, owner: &str, name: &str) -> Self {
        {
            let mut state = self.state();
            let info = RepoInfo::new(owner, name, "main", false);
            let key = info.full_name.clone();
            state.repos.insert(key.clone(), info);
            state
                .branches
                .entry(key)
                .or_default()
                .insert("main".into(), format!("head-{owner}-{name}"));
        }
        self
    }

    pub(crate) fn with_permission(self, repo: &str, answer: Result<Permission, u16>) -> Self {
        self.state().permissions.insert(repo.to_string(), answer);
        self
    }

    /// Answer the next permission check with `answer`, then fall back to the usual lookup.
    pub(crate) fn queue_permission(self, answer: Result<Permission, u16>) -> Self {
        self.state().permission_queue.push_back(answer);
        self
    }

    pub(crate) fn with_file(self, repo: &str, branch: &str, path: &str, content: &str) -> Self {
        {
            let mut state = self.state();
            let sha = state.fresh_sha();
            state.files.insert(
                (repo.to_string(), branch.to_string(), path.to_string()),
                RemoteFile {
                    sha,
                    content: content.as_bytes().to_vec(),
                },
            );
        }
        self
    }

    pub(crate) fn with_device_code(self, device_code: &str, interval: u64, expires_in: u64) -> Self {
        self.state().device_codes.push_back(DeviceCode {
            device_code: device_code.to_string(),
            user_code: "WDJB-MJHT".to_string(),
            verification_uri: "https://github.com/login/device".to_string(),
            expires_in,
            interval,
        });
        self
    }

    pub(crate) fn with_poll_error(self, error: &str) -> Self {
        self.state().polls.push_back(TokenResponse {
            error: Some(error.to_string()),
            ..Default::default()
        });
        self
    }

    pub(crate) fn with_poll_token(self, token: &str) -> Self {
        self.state().polls.push_back(TokenResponse {
            access_token: Some(token.to_string()),
            scope: Some("repo".to_string()),
            error: None,
        });
        self
    }

    pub(crate) fn file(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        self.state()
            .files
            .get(&(repo.to_string(), branch.to_string(), path.to_string()))
            .map(|f| String::from_utf8_lossy(&f.content).into_owned())
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }
}

fn scripted_out(what: &str) -> HostError {
    HostError::Status {
        code: 500,
        body: format!("no scripted {what}"),
    }
}

#[async_trait]
impl RepositoryHost for FakeHost {
    async fn request_device_code(
        &self,
        _client_id: &str,
        _scope: &str,
    ) -> Result<DeviceCode, HostError> {
        let mut state = self.state();
        state.device_requests += 1;
        state
            .device_codes
            .pop_front()
            .ok_or_else(|| scripted_out("device code"))
    }

    async fn poll_token(
        &self,
        _client_id: &str,
        _device_code: &str,
    ) -> Result<TokenResponse, HostError> {
        let mut state = self.state();
        state.poll_times.push(Instant::now());
        state.polls.pop_front().ok_or_else(|| scripted_out("poll"))
    }

    async fn current_user(&self, token: &str) -> Result<User, HostError> {
        self.state()
            .users
            .get(token)
            .cloned()
            .ok_or(HostError::Unauthorized)
    }

    async fn repository(&self, _token: &str, repo: &RepoRef) -> Result<RepoInfo, HostError> {
        self.state()
            .repos
            .get(&repo.to_string())
            .cloned()
            .ok_or(HostError::NotFound)
    }

    async fn permission(
        &self,
        _token: &str,
        repo: &RepoRef,
        user: &str,
    ) -> Result<Permission, HostError> {
        let mut state = self.state();
        state.permission_checks += 1;
        if !state.repos.contains_key(&repo.to_string()) {
            return Err(HostError::NotFound);
        }
        let answer = match state.permission_queue.pop_front() {
            Some(answer) => Some(answer),
            None => state.permissions.get(&repo.to_string()).copied(),
        };
        match answer {
            Some(Ok(level)) => Ok(level),
            Some(Err(401)) => Err(HostError::Unauthorized),
            Some(Err(403)) => Err(HostError::Forbidden),
            Some(Err(404)) => Err(HostError::NotFound),
            Some(Err(code)) => Err(HostError::Status {
                code,
                body: String::new(),
            }),
            None if repo.owner == user => Ok(Permission::Admin),
            None => Ok(Permission::Read),
        }
    }

    async fn fork(&self, token: &str, repo: &RepoRef) -> Result<RepoInfo, HostError> {
        let mut state = self.state();
        let login = state
            .users
            .get(token)
            .map(|u| u.login.clone())
            .ok_or(HostError::Unauthorized)?;
        let upstream = state
            .repos
            .get(&repo.to_string())
            .cloned()
            .ok_or(HostError::NotFound)?;
        state.forks_created += 1;
        state.log.push(format!("fork {repo}"));

        let fork = RepoInfo::new(&login, &upstream.name, &upstream.default_branch, true);
        let key = fork.full_name.clone();
        if !state.repos.contains_key(&key) {
            state.repos.insert(key.clone(), fork.clone());
            let head = format!("head-{key}");
            state
                .branches
                .entry(key.clone())
                .or_default()
                .insert(upstream.default_branch.clone(), head);
            state.copy_files(
                (upstream.full_name.as_str(), upstream.default_branch.as_str()),
                (key.as_str(), upstream.default_branch.as_str()),
            );
        }
        Ok(fork)
    }

    async fn download_file(
        &self,
        _token: &str,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Option<RemoteFile>, HostError> {
        let state = self.state();
        let branch = state.branch_of(repo, branch)?;
        Ok(state
            .files
            .get(&(repo.to_string(), branch, path.to_string()))
            .cloned())
    }

    async fn put_file(
        &self,
        _token: &str,
        repo: &RepoRef,
        write: &FileWrite<'_>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let branch = state.branch_of(repo, write.branch)?;
        let key = (repo.to_string(), branch.clone(), write.path.to_string());
        let current = state.files.get(&key).map(|f| f.sha.clone());
        if current.as_deref() != write.sha {
            return Err(HostError::Status {
                code: 409,
                body: format!("{} does not match {:?}", write.path, write.sha),
            });
        }
        let sha = state.fresh_sha();
        state.log.push(format!(
            "put {repo}@{branch} {} sha={}",
            write.path,
            write.sha.unwrap_or("-")
        ));
        state.files.insert(
            key,
            RemoteFile {
                sha,
                content: write.content.to_vec(),
            },
        );
        Ok(())
    }

    async fn branch_head(
        &self,
        _token: &str,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<String, HostError> {
        self.state()
            .branches
            .get(&repo.to_string())
            .and_then(|b| b.get(branch))
            .cloned()
            .ok_or(HostError::NotFound)
    }

    async fn ensure_branch(
        &self,
        _token: &str,
        repo: &RepoRef,
        branch: &str,
        from_sha: &str,
    ) -> Result<bool, HostError> {
        let mut state = self.state();
        let key = repo.to_string();
        let default = state.branch_of(repo, None)?;
        let branches = state.branches.entry(key.clone()).or_default();
        if branches.contains_key(branch) {
            return Ok(false);
        }
        branches.insert(branch.to_string(), from_sha.to_string());
        state.log.push(format!("branch {key} {branch}"));
        state.copy_files((key.as_str(), default.as_str()), (key.as_str(), branch));
        Ok(true)
    }

    async fn find_open_pull(
        &self,
        _token: &str,
        _repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<PullRequest>, HostError> {
        Ok(self.state().open_pulls.get(branch).cloned())
    }

    async fn create_pull(
        &self,
        _token: &str,
        repo: &RepoRef,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequest, HostError> {
        let mut state = self.state();
        let number = state.pulls.len() as u64 + 1;
        state.pulls.push((
            repo.to_string(),
            pull.head.to_string(),
            pull.base.to_string(),
            pull.title.to_string(),
        ));
        state.log.push(format!("pull {repo} {}", pull.head));
        let created = PullRequest {
            number,
            html_url: format!("https://example.test/{repo}/pull/{number}"),
        };
        let branch = pull
            .head
            .split_once(':')
            .map(|(_, b)| b)
            .unwrap_or(pull.head);
        state.open_pulls.insert(branch.to_string(), created.clone());
        Ok(created)
    }
}
