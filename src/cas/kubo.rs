//! [`CasNode`] backed by a kubo (go-ipfs) node's HTTP RPC API.

use super::{API_ENV, AddOptions, CasNode, DEFAULT_API};
use crate::errors::CasError;
use async_trait::async_trait;
use reqwest::Body;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Routing event type for a provider record.
const PROVIDER_EVENT: i32 = 4;

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RoutingEvent {
    #[serde(rename = "Type")]
    kind: i32,
    #[serde(rename = "Responses", default)]
    responses: Option<Vec<PeerInfo>>,
}

#[derive(Debug, Deserialize)]
struct PeerInfo {
    #[serde(rename = "ID")]
    id: String,
}

/// Count distinct provider peers in a newline-delimited `findprovs` stream.
/// Lines that are not routing events are ignored.
pub(crate) fn count_providers(body: &str) -> usize {
    let mut peers = HashSet::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(event) = serde_json::from_str::<RoutingEvent>(line) else {
            continue;
        };
        if event.kind != PROVIDER_EVENT {
            continue;
        }
        for peer in event.responses.unwrap_or_default() {
            peers.insert(peer.id);
        }
    }
    peers.len()
}

pub struct KuboNode {
    client: reqwest::Client,
    base: String,
}

impl KuboNode {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Address from `ARK_IPFS_API`, falling back to the local default.
    pub fn from_env() -> Self {
        Self::new(std::env::var(API_ENV).unwrap_or_else(|_| DEFAULT_API.to_string()))
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.base, command)
    }

    async fn call(
        &self,
        command: &str,
        query: &[(&str, String)],
        form: Option<Form>,
    ) -> Result<reqwest::Response, CasError> {
        let mut request = self.client.post(self.endpoint(command)).query(query);
        if let Some(form) = form {
            request = request.multipart(form);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| CasError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CasError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl CasNode for KuboNode {
    async fn add(&self, path: &Path, options: &AddOptions) -> Result<String, CasError> {
        let io_err = |source| CasError::Io {
            path: path.to_path_buf(),
            source,
        };
        let absolute = std::path::absolute(path).map_err(io_err)?;
        let file = tokio::fs::File::open(&absolute).await.map_err(io_err)?;
        let len = file.metadata().await.map_err(io_err)?.len();

        let mut headers = HeaderMap::new();
        let abspath = HeaderValue::from_bytes(absolute.as_os_str().as_encoded_bytes())
            .map_err(|e| CasError::Decode(e.to_string()))?;
        headers.insert("Abspath", abspath);

        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let part = Part::stream_with_length(Body::from(file), len)
            .file_name(name)
            .headers(headers);
        let form = Form::new().part("file", part);

        let query = [
            ("nocopy", options.no_copy.to_string()),
            ("pin", options.pin.to_string()),
            ("cid-version", options.cid_version.to_string()),
            ("hash", options.hash.to_string()),
        ];
        let added: AddResponse = self
            .call("add", &query, Some(form))
            .await?
            .json()
            .await
            .map_err(|e| CasError::Decode(e.to_string()))?;
        debug!(path = %absolute.display(), fingerprint = %added.hash, "added to storage node");
        Ok(added.hash)
    }

    async fn get(&self, fingerprint: &str) -> Result<Vec<u8>, CasError> {
        let bytes = self
            .call("cat", &[("arg", fingerprint.to_string())], None)
            .await?
            .bytes()
            .await
            .map_err(|e| CasError::Unreachable(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn pin(&self, fingerprint: &str) -> Result<(), CasError> {
        self.call(
            "pin/add",
            &[
                ("arg", fingerprint.to_string()),
                ("recursive", "true".to_string()),
            ],
            None,
        )
        .await?;
        Ok(())
    }

    async fn find_providers(&self, fingerprint: &str, max: usize) -> Result<usize, CasError> {
        let body = self
            .call(
                "routing/findprovs",
                &[
                    ("arg", fingerprint.to_string()),
                    ("num-providers", max.to_string()),
                ],
                None,
            )
            .await?
            .text()
            .await
            .map_err(|e| CasError::Unreachable(e.to_string()))?;
        Ok(count_providers(&body).min(max))
    }
}
