//! Dropbox HTTP API v2 backend.
//!
//! Only the handful of endpoints the watcher needs are implemented. The
//! session is a long-lived bearer token taken from the config file; obtaining
//! one interactively (OAuth code flow) is out of scope.
//!
//! ## Error mapping
//!
//! | HTTP | Meaning | [`RelayError`] |
//! |------|---------|----------------|
//! | 401  | token expired / revoked | `Unauthorized` |
//! | 409  | endpoint-specific failure (`path/not_found`, `to/conflict`, …) | `Storage` |
//! | other non-2xx | transport-level problem | `Http` |

use super::{Entry, EntryKind, RemoteStorage};
use crate::error::RelayError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "dropbox";

pub const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com/2";
pub const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

/// [`RemoteStorage`] over the Dropbox HTTP API.
#[derive(Clone)]
pub struct DropboxStorage {
    client: reqwest::Client,
    access_token: String,
    api_base: String,
    content_base: String,
}

impl std::fmt::Debug for DropboxStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxStorage")
            .field("api_base", &self.api_base)
            .field("content_base", &self.content_base)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ListFolderResult {
    entries: Vec<RawEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

#[derive(Deserialize)]
struct Account {
    name: AccountName,
}

#[derive(Deserialize)]
struct AccountName {
    display_name: String,
}

impl DropboxStorage {
    /// Build a client without contacting Dropbox.
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            access_token: access_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            content_base: DEFAULT_CONTENT_BASE.to_string(),
        })
    }

    /// Point the client at different API hosts (proxies, test servers).
    pub fn with_base_urls(mut self, api_base: impl Into<String>, content_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.content_base = content_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build a client and verify the token by fetching the account name.
    pub async fn connect(access_token: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let storage = Self::new(access_token, timeout)?;
        info!("Attempting Dropbox connection...");
        let name = storage.account_display_name().await?;
        info!("Dropbox connection established. Connected as {}", name);
        Ok(storage)
    }

    /// Display name of the account the token belongs to.
    pub async fn account_display_name(&self) -> Result<String, RelayError> {
        let endpoint = "users/get_current_account";
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.api_base))
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, "application/json")
            .body("null")
            .send()
            .await
            .map_err(|e| RelayError::transport(SERVICE, endpoint, e))?;
        let response = check(endpoint, "", response).await?;
        let account: Account = response
            .json()
            .await
            .map_err(|e| RelayError::malformed(SERVICE, endpoint, e))?;
        Ok(account.name.display_name)
    }

    /// JSON-in/JSON-out call against the API host.
    async fn rpc(
        &self,
        endpoint: &'static str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, RelayError> {
        debug!(endpoint, path, "Dropbox RPC");
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.api_base))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::transport(SERVICE, endpoint, e))?;
        check(endpoint, path, response).await
    }

    /// Content-host call: arguments travel in the `Dropbox-API-Arg` header.
    async fn content(
        &self,
        endpoint: &'static str,
        path: &str,
        arg: serde_json::Value,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, RelayError> {
        debug!(endpoint, path, "Dropbox content call");
        let mut request = self
            .client
            .post(format!("{}/{endpoint}", self.content_base))
            .bearer_auth(&self.access_token)
            .header("Dropbox-API-Arg", header_arg(&arg));
        if let Some(bytes) = body {
            request = request
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes);
        }
        let response = request
            .send()
            .await
            .map_err(|e| RelayError::transport(SERVICE, endpoint, e))?;
        check(endpoint, path, response).await
    }
}

#[async_trait]
impl RemoteStorage for DropboxStorage {
    async fn list_folder(&self, path: &str) -> Result<Vec<Entry>, RelayError> {
        // The API addresses the root as "", never "/".
        let api_path = if path == "/" { "" } else { path };
        let mut page: ListFolderResult = self
            .rpc("files/list_folder", path, json!({ "path": api_path }))
            .await?
            .json()
            .await
            .map_err(|e| RelayError::malformed(SERVICE, "files/list_folder", e))?;

        let mut entries = Vec::new();
        loop {
            entries.extend(page.entries.into_iter().filter_map(|raw| {
                let kind = match raw.tag.as_str() {
                    "file" => EntryKind::File,
                    "folder" => EntryKind::Folder,
                    _ => return None,
                };
                Some(Entry { name: raw.name, kind })
            }));
            if !page.has_more {
                break;
            }
            page = self
                .rpc("files/list_folder/continue", path, json!({ "cursor": page.cursor }))
                .await?
                .json()
                .await
                .map_err(|e| RelayError::malformed(SERVICE, "files/list_folder/continue", e))?;
        }
        Ok(entries)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, RelayError> {
        let bytes = self
            .content("files/download", path, json!({ "path": path }), None)
            .await?
            .bytes()
            .await
            .map_err(|e| RelayError::transport(SERVICE, "files/download", e))?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), RelayError> {
        let mode = if overwrite { "overwrite" } else { "add" };
        let arg = json!({
            "path": path,
            "mode": mode,
            "autorename": false,
            "mute": false,
        });
        self.content("files/upload", path, arg, Some(bytes)).await?;
        Ok(())
    }

    async fn move_entry(&self, from: &str, to: &str) -> Result<(), RelayError> {
        let body = json!({ "from_path": from, "to_path": to, "autorename": false });
        self.rpc("files/move_v2", from, body).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RelayError> {
        self.rpc("files/delete_v2", path, json!({ "path": path })).await?;
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<(), RelayError> {
        let body = json!({ "path": path, "autorename": false });
        self.rpc("files/create_folder_v2", path, body).await?;
        Ok(())
    }
}

/// Map non-success responses onto [`RelayError`].
async fn check(
    endpoint: &'static str,
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 => Err(RelayError::Unauthorized {
            service: SERVICE,
            detail: body,
        }),
        409 => {
            let summary = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error_summary)
                .unwrap_or(body);
            Err(RelayError::storage(endpoint, path, summary))
        }
        code => Err(RelayError::Http {
            service: SERVICE,
            operation: endpoint.to_string(),
            status: code,
            body,
        }),
    }
}

/// Serialise a header argument, escaping non-ASCII as `\uXXXX`.
///
/// HTTP header values must be ASCII; Dropbox expects JSON escapes for
/// anything else (file names with accents, emoji, …).
fn header_arg(value: &serde_json::Value) -> String {
    let json = value.to_string();
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}
