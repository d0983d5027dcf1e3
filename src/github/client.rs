//! [`RepositoryHost`] over GitHub's REST API and OAuth device flow endpoints.

use super::{
    DeviceCode, FileWrite, NewPullRequest, Permission, PullRequest, RemoteFile, RepoInfo,
    RepoRef, RepositoryHost, TokenResponse, User,
};
use crate::errors::HostError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_LOGIN_BASE: &str = "https://github.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
const FORK_TIMEOUT: Duration = Duration::from_secs(20);
const DEVICE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const AGENT: &str = concat!("ark/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
    html_url: String,
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    login_base: String,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubClient {
    pub fn new() -> Self {
        Self::with_bases(DEFAULT_API_BASE, DEFAULT_LOGIN_BASE)
    }

    /// Point the client at other hosts (used by tests).
    pub fn with_bases(api_base: impl Into<String>, login_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            login_base: login_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn api(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}", self.api_base, path))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, AGENT)
            .timeout(REQUEST_TIMEOUT);
        if token.is_empty() {
            req
        } else {
            req.bearer_auth(token)
        }
    }

    fn login(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.login_base, path))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, AGENT)
            .timeout(REQUEST_TIMEOUT)
    }

    async fn contents(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Option<ContentsResponse>, HostError> {
        let mut req = self.api(
            Method::GET,
            &format!("/repos/{repo}/contents/{}", path.trim_start_matches('/')),
            token,
        );
        if let Some(branch) = branch {
            req = req.query(&[("ref", branch)]);
        }
        match send(req).await {
            Ok(resp) => Ok(Some(decode(resp).await?)),
            Err(HostError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Send a request and map failures onto [`HostError`].
async fn send(req: RequestBuilder) -> Result<Response, HostError> {
    let resp = req
        .send()
        .await
        .map_err(|e| HostError::Unreachable(e.to_string()))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    debug!(status = status.as_u16(), "repository host returned an error");
    Err(match status {
        StatusCode::UNAUTHORIZED => HostError::Unauthorized,
        StatusCode::FORBIDDEN => HostError::Forbidden,
        StatusCode::NOT_FOUND => HostError::NotFound,
        _ => HostError::Status {
            code: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        },
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, HostError> {
    resp.json::<T>()
        .await
        .map_err(|e| HostError::Decode(e.to_string()))
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn request_device_code(
        &self,
        client_id: &str,
        scope: &str,
    ) -> Result<DeviceCode, HostError> {
        let req = self
            .login("/login/device/code")
            .form(&[("client_id", client_id), ("scope", scope)]);
        decode(send(req).await?).await
    }

    async fn poll_token(
        &self,
        client_id: &str,
        device_code: &str,
    ) -> Result<TokenResponse, HostError> {
        let req = self.login("/login/oauth/access_token").form(&[
            ("client_id", client_id),
            ("device_code", device_code),
            ("grant_type", DEVICE_GRANT),
        ]);
        decode(send(req).await?).await
    }

    async fn current_user(&self, token: &str) -> Result<User, HostError> {
        decode(send(self.api(Method::GET, "/user", token)).await?).await
    }

    async fn repository(&self, token: &str, repo: &RepoRef) -> Result<RepoInfo, HostError> {
        decode(send(self.api(Method::GET, &format!("/repos/{repo}"), token)).await?).await
    }

    async fn permission(
        &self,
        token: &str,
        repo: &RepoRef,
        user: &str,
    ) -> Result<Permission, HostError> {
        let path = format!("/repos/{repo}/collaborators/{user}/permission");
        let resp: PermissionResponse = decode(send(self.api(Method::GET, &path, token)).await?).await?;
        Ok(Permission::from_api(&resp.permission))
    }

    async fn fork(&self, token: &str, repo: &RepoRef) -> Result<RepoInfo, HostError> {
        let req = self
            .api(Method::POST, &format!("/repos/{repo}/forks"), token)
            .timeout(FORK_TIMEOUT);
        decode(send(req).await?).await
    }

    async fn download_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        branch: Option<&str>,
    ) -> Result<Option<RemoteFile>, HostError> {
        let Some(contents) = self.contents(token, repo, path, branch).await? else {
            return Ok(None);
        };
        // The API wraps base64 at 60 columns.
        let packed: String = contents
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let content = STANDARD
            .decode(packed)
            .map_err(|e| HostError::Decode(e.to_string()))?;
        Ok(Some(RemoteFile {
            sha: contents.sha,
            content,
        }))
    }

    async fn put_file(
        &self,
        token: &str,
        repo: &RepoRef,
        write: &FileWrite<'_>,
    ) -> Result<(), HostError> {
        let mut body = json!({
            "message": write.message,
            "content": STANDARD.encode(write.content),
        });
        if let Some(sha) = write.sha {
            body["sha"] = json!(sha);
        }
        if let Some(branch) = write.branch {
            body["branch"] = json!(branch);
        }
        if let Some(committer) = write.committer {
            body["committer"] = json!(committer);
        }
        let path = format!("/repos/{repo}/contents/{}", write.path.trim_start_matches('/'));
        send(self.api(Method::PUT, &path, token).json(&body)).await?;
        Ok(())
    }

    async fn branch_head(
        &self,
        token: &str,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<String, HostError> {
        let path = format!("/repos/{repo}/git/ref/heads/{branch}");
        let resp: RefResponse = decode(send(self.api(Method::GET, &path, token)).await?).await?;
        Ok(resp.object.sha)
    }

    async fn ensure_branch(
        &self,
        token: &str,
        repo: &RepoRef,
        branch: &str,
        from_sha: &str,
    ) -> Result<bool, HostError> {
        let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": from_sha });
        let req = self
            .api(Method::POST, &format!("/repos/{repo}/git/refs"), token)
            .json(&body);
        match send(req).await {
            Ok(_) => Ok(true),
            // "Reference already exists"
            Err(HostError::Status { code: 422, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn find_open_pull(
        &self,
        token: &str,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<PullRequest>, HostError> {
        let query = format!("head:{branch} type:pr state:open repo:{repo}");
        let req = self
            .api(Method::GET, "/search/issues", token)
            .query(&[("q", query.as_str())]);
        let resp: SearchResponse = decode(send(req).await?).await?;
        Ok(resp.items.into_iter().next().map(|item| PullRequest {
            number: item.number,
            html_url: item.html_url,
        }))
    }

    async fn create_pull(
        &self,
        token: &str,
        repo: &RepoRef,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequest, HostError> {
        let body = json!({
            "title": pull.title,
            "body": pull.body,
            "head": pull.head,
            "base": pull.base,
        });
        let req = self
            .api(Method::POST, &format!("/repos/{repo}/pulls"), token)
            .json(&body);
        decode(send(req).await?).await
    }
}
