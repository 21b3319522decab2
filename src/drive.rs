//! Google Drive v3 client, consumed through the [`DriveApi`] trait.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const FILE_FIELDS: &str = "id,name,mimeType,parents,trashed";
const LIST_FIELDS: &str = "files(id,name,mimeType,parents,trashed)";

/// Subset of the Drive `File` resource we read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// A name lookup against the provider's search API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Non-trashed folders with exactly this name.
    Folder { name: String },
    /// Non-trashed items with exactly this name directly under `parent_id`.
    InFolder { name: String, parent_id: String },
}

impl SearchQuery {
    pub fn folder(name: impl Into<String>) -> Self {
        Self::Folder { name: name.into() }
    }

    pub fn in_folder(name: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::InFolder {
            name: name.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Renders the query in Drive's `q` syntax.
    pub fn to_query_string(&self) -> String {
        match self {
            Self::Folder { name } => format!(
                "mimeType = '{}' and name = '{}' and trashed = false",
                FOLDER_MIME_TYPE,
                escape_query_value(name)
            ),
            Self::InFolder { name, parent_id } => format!(
                "name = '{}' and '{}' in parents and trashed = false",
                escape_query_value(name),
                escape_query_value(parent_id)
            ),
        }
    }
}

pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// One ranged slice of an object's media.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub data: Bytes,
    /// Total object size, when the provider reported it.
    pub total_size: Option<u64>,
}

impl MediaChunk {
    /// Whether a download that has received `received` bytes, this chunk
    /// included, is complete. `requested` is the length asked for.
    ///
    /// Without a known total only a short or empty chunk marks the end.
    pub fn completes(&self, received: u64, requested: u64) -> bool {
        match self.total_size {
            Some(total) => received >= total,
            None => (self.data.len() as u64) < requested,
        }
    }
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Lists matches in a stable order (oldest first).
    async fn search(&self, access_token: &str, query: &SearchQuery) -> Result<Vec<DriveFile>>;

    async fn create_file(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile>;

    /// Replaces the content of `file_id`; metadata is limited to the name.
    async fn update_file(
        &self,
        access_token: &str,
        file_id: &str,
        name: &str,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile>;

    async fn media_chunk(
        &self,
        access_token: &str,
        file_id: &str,
        offset: u64,
        len: u64,
    ) -> Result<MediaChunk>;
}

pub struct DriveClient {
    http: Client,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    pub fn new(http: Client, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            upload_base: upload_base.into(),
        }
    }

    fn url(base: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(base)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid Drive base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Drive base URL cannot be a base")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Drive response: {}", e)))
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!("Drive API error: {} - {}", status, body);
        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound("Drive resource not found".into()),
            StatusCode::UNAUTHORIZED => AppError::Unauthenticated,
            _ => AppError::Upstream(format!("Drive API error: {}", status)),
        })
    }

    async fn send_multipart(
        &self,
        request: reqwest::RequestBuilder,
        access_token: &str,
        metadata: serde_json::Value,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile> {
        let boundary = format!("drive_gateway_{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &metadata, &content, mime_type);

        let response = request
            .bearer_auth(access_token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to upload file: {}", e)))?;

        Self::handle_response(response).await
    }
}

fn multipart_related_body(
    boundary: &str,
    metadata: &serde_json::Value,
    content: &[u8],
    mime_type: &str,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--", boundary).as_bytes());
    body
}

/// Parses the total from `Content-Range: bytes 0-99/1234`.
///
/// Returns `None` for a malformed header and `Some(None)` for an unknown (`*`) total.
fn content_range_total(value: &str) -> Option<Option<u64>> {
    let (range, total) = value.trim().rsplit_once('/')?;
    if !range.starts_with("bytes ") {
        return None;
    }
    match total.trim() {
        "*" => Some(None),
        total => total.parse().ok().map(Some),
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn search(&self, access_token: &str, query: &SearchQuery) -> Result<Vec<DriveFile>> {
        let url = Self::url(&self.api_base, &["files"])?;
        let q = query.to_query_string();
        debug!("Drive search: {}", q);

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("q", q.as_str()),
                ("fields", LIST_FIELDS),
                ("orderBy", "createdTime"),
                ("pageSize", "100"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to search files: {}", e)))?;

        let list: FileList = Self::handle_response(response).await?;
        Ok(list.files)
    }

    async fn create_file(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile> {
        let url = Self::url(&self.upload_base, &["files"])?;
        let mut metadata = serde_json::json!({ "name": name });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        self.send_multipart(self.http.post(url), access_token, metadata, content, mime_type)
            .await
    }

    async fn update_file(
        &self,
        access_token: &str,
        file_id: &str,
        name: &str,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile> {
        let url = Self::url(&self.upload_base, &["files", file_id])?;
        let metadata = serde_json::json!({ "name": name });

        self.send_multipart(self.http.patch(url), access_token, metadata, content, mime_type)
            .await
    }

    async fn media_chunk(
        &self,
        access_token: &str,
        file_id: &str,
        offset: u64,
        len: u64,
    ) -> Result<MediaChunk> {
        let url = Self::url(&self.api_base, &["files", file_id])?;
        let last = offset.saturating_add(len.max(1) - 1);
        let range = format!("bytes={}-{}", offset, last);

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(header::RANGE, range)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to download chunk: {}", e)))?;

        // Empty objects cannot satisfy any range.
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE && offset == 0 {
            return Ok(MediaChunk {
                data: Bytes::new(),
                total_size: Some(0),
            });
        }

        let response = Self::check_status(response).await?;
        let partial_total = if response.status() == StatusCode::PARTIAL_CONTENT {
            let total = response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(content_range_total)
                .ok_or_else(|| {
                    AppError::Upstream("Partial content without a valid Content-Range".into())
                })?;
            Some(total)
        } else {
            None
        };

        let data = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to read chunk: {}", e)))?;

        // A plain 200 carries the whole object.
        let total_size = match partial_total {
            Some(total) => total,
            None => Some(offset + data.len() as u64),
        };

        Ok(MediaChunk { data, total_size })
    }
}
