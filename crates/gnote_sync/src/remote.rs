//! The Remote Client: a thin, authenticated wrapper over the
//! user's Drive REST surface, with a mutex serializing every upload and
//! typed error mapping from HTTP status + body, built on `reqwest` the
//! same way a Tauri cloud-sync target wraps its REST calls.

use std::future::Future;
use std::time::Duration;

use gnote_core::model::RemoteFileId;
use tokio::sync::Mutex;

use crate::error::{Result, SyncError};

/// Metadata about a remote file, as returned by a listing or a
/// `getMetadata` call.
#[derive(Debug, Clone)]
pub struct RemoteMetadata {
    /// Opaque remote file handle.
    pub file_id: RemoteFileId,
    /// File name as stored on the remote (informational only — truth is
    /// discovery by listing, per the index/folder layer's design).
    pub name: String,
    /// Remote-side last-modified timestamp, ms.
    pub modified_time: i64,
    /// Opaque token used as the `If-Match` precondition on update.
    pub etag: String,
}

/// Authenticated Drive REST wrapper.
///
/// Implementors are expected to serialize concurrent uploads behind a
/// single mutex (`upload_mutex` on [`GoogleDriveClient`]) — the trait
/// itself only pins down the operations, not that lock, since a fake
/// used in tests has no need for it.
pub trait RemoteClient: Send + Sync {
    /// List files matching a query (used by the index/folder layer for
    /// canonical discovery, and for locating/creating the app folder).
    fn list_by_query(&self, query: &str) -> impl Future<Output = Result<Vec<RemoteMetadata>>> + Send;

    /// Fetch metadata for a single file.
    fn get_metadata(&self, file_id: &RemoteFileId) -> impl Future<Output = Result<RemoteMetadata>> + Send;

    /// Download a file's content.
    fn download(&self, file_id: &RemoteFileId) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Create a new file under `parent`, returning its assigned id.
    fn create_file(
        &self,
        parent: &str,
        name: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<RemoteFileId>> + Send;

    /// Overwrite an existing file's content. `if_match`, when set, is
    /// sent as the optimistic-concurrency precondition; a mismatch maps
    /// to [`SyncError::PreconditionFailed`].
    fn update_file(
        &self,
        file_id: &RemoteFileId,
        content: &[u8],
        if_match: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a file. A 404 is mapped to `Ok(())` by the implementation,
    /// not surfaced as [`SyncError::NotFound`] — deleting an
    /// already-gone file is success.
    fn delete_file(&self, file_id: &RemoteFileId) -> impl Future<Output = Result<()>> + Send;

    /// Create (or return the existing) top-level app folder.
    fn create_folder(&self, name: &str) -> impl Future<Output = Result<String>> + Send;

    /// Swap in a freshly refreshed access token. Called by the Sync
    /// Engine after a successful `AuthExpired` recovery. Fakes used in
    /// tests that carry no token can leave this a no-op.
    fn set_access_token(&self, token: &str);
}

/// Google Drive-backed [`RemoteClient`]. Holds the bearer token
/// out-of-band (callers refresh it via `gnote_core::session::Session`
/// and pass the current value per call) and serializes uploads behind
/// `upload_mutex`.
pub struct GoogleDriveClient {
    http: reqwest::Client,
    access_token: std::sync::RwLock<String>,
    upload_mutex: Mutex<()>,
    timeout: Duration,
}

impl GoogleDriveClient {
    /// Build a client with the given initial access token and request
    /// timeout.
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Self {
        GoogleDriveClient {
            http: reqwest::Client::new(),
            access_token: std::sync::RwLock::new(access_token.into()),
            upload_mutex: Mutex::new(()),
            timeout,
        }
    }

    fn token(&self) -> String {
        self.access_token.read().unwrap().clone()
    }

    fn map_status(status: reqwest::StatusCode, body: &str) -> SyncError {
        match status.as_u16() {
            401 => SyncError::AuthExpired,
            403 if body.to_lowercase().contains("quota") => SyncError::QuotaExceeded,
            403 => SyncError::PermissionDenied,
            404 => SyncError::NotFound,
            412 => SyncError::PreconditionFailed,
            429 => SyncError::QuotaExceeded,
            500..=599 => SyncError::NetworkError(format!("server error {status}")),
            _ => SyncError::NetworkError(format!("unexpected status {status}: {body}")),
        }
    }
}

impl RemoteClient for GoogleDriveClient {
    async fn list_by_query(&self, query: &str) -> Result<Vec<RemoteMetadata>> {
        let resp = self
            .http
            .get("https://www.googleapis.com/drive/v3/files")
            .bearer_auth(self.token())
            .query(&[("q", query), ("fields", "files(id,name,modifiedTime,md5Checksum)")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SyncError::Corrupted(e.to_string()))?;
        let files = body
            .get("files")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        files
            .into_iter()
            .map(|f| {
                Ok(RemoteMetadata {
                    file_id: RemoteFileId(
                        f.get("id")
                            .and_then(|v| v.as_str())
                            .ok_or_else(|| SyncError::Corrupted("missing id".into()))?
                            .to_string(),
                    ),
                    name: f.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    modified_time: f
                        .get("modifiedTime")
                        .and_then(|v| v.as_str())
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|d| d.timestamp_millis())
                        .unwrap_or(0),
                    etag: f
                        .get("md5Checksum")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect()
    }

    async fn get_metadata(&self, file_id: &RemoteFileId) -> Result<RemoteMetadata> {
        let resp = self
            .http
            .get(format!("https://www.googleapis.com/drive/v3/files/{}", file_id.0))
            .bearer_auth(self.token())
            .query(&[("fields", "id,name,modifiedTime,md5Checksum")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Self::map_status(status, &text));
        }
        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| SyncError::Corrupted(e.to_string()))?;
        Ok(RemoteMetadata {
            file_id: file_id.clone(),
            name: body.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            modified_time: body
                .get("modifiedTime")
                .and_then(|v| v.as_str())
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.timestamp_millis())
                .unwrap_or(0),
            etag: body.get("md5Checksum").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        })
    }

    async fn download(&self, file_id: &RemoteFileId) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(format!(
                "https://www.googleapis.com/drive/v3/files/{}?alt=media",
                file_id.0
            ))
            .bearer_auth(self.token())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| SyncError::NetworkError(e.to_string()))
    }

    async fn create_file(&self, parent: &str, name: &str, content: &[u8]) -> Result<RemoteFileId> {
        let _guard = self.upload_mutex.lock().await;
        let metadata = serde_json::json!({ "name": name, "parents": [parent] });
        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .unwrap(),
            )
            .part(
                "file",
                reqwest::multipart::Part::bytes(content.to_vec()).mime_str("application/json").unwrap(),
            );

        let resp = self
            .http
            .post("https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart")
            .bearer_auth(self.token())
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Self::map_status(status, &text));
        }
        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| SyncError::Corrupted(e.to_string()))?;
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::Corrupted("create response missing id".into()))?;
        Ok(RemoteFileId(id.to_string()))
    }

    async fn update_file(&self, file_id: &RemoteFileId, content: &[u8], if_match: Option<&str>) -> Result<()> {
        let _guard = self.upload_mutex.lock().await;
        let mut req = self
            .http
            .patch(format!(
                "https://www.googleapis.com/upload/drive/v3/files/{}?uploadType=media",
                file_id.0
            ))
            .bearer_auth(self.token())
            .body(content.to_vec())
            .timeout(self.timeout);
        if let Some(etag) = if_match {
            req = req.header("If-Match", etag);
        }
        let resp = req.send().await.map_err(|e| SyncError::NetworkError(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }
        Ok(())
    }

    async fn delete_file(&self, file_id: &RemoteFileId) -> Result<()> {
        let resp = self
            .http
            .delete(format!("https://www.googleapis.com/drive/v3/files/{}", file_id.0))
            .bearer_auth(self.token())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }
        Ok(())
    }

    async fn create_folder(&self, name: &str) -> Result<String> {
        let existing = self
            .list_by_query(&format!(
                "name = '{name}' and mimeType = 'application/vnd.google-apps.folder' and trashed = false"
            ))
            .await?;
        if let Some(found) = existing.into_iter().next() {
            return Ok(found.file_id.0);
        }

        let _guard = self.upload_mutex.lock().await;
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": "application/vnd.google-apps.folder",
        });
        let resp = self
            .http
            .post("https://www.googleapis.com/drive/v3/files")
            .bearer_auth(self.token())
            .json(&metadata)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Self::map_status(status, &text));
        }
        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| SyncError::Corrupted(e.to_string()))?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SyncError::Corrupted("create folder response missing id".into()))
    }

    fn set_access_token(&self, token: &str) {
        *self.access_token.write().unwrap() = token.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_distinguishes_quota_from_permission() {
        assert!(matches!(
            GoogleDriveClient::map_status(reqwest::StatusCode::FORBIDDEN, "quota exceeded for user"),
            SyncError::QuotaExceeded
        ));
        assert!(matches!(
            GoogleDriveClient::map_status(reqwest::StatusCode::FORBIDDEN, "insufficient permission"),
            SyncError::PermissionDenied
        ));
    }

    #[test]
    fn precondition_failed_maps_to_412() {
        assert!(matches!(
            GoogleDriveClient::map_status(reqwest::StatusCode::PRECONDITION_FAILED, ""),
            SyncError::PreconditionFailed
        ));
    }

    #[test]
    fn server_error_is_retryable_network_error() {
        let err = GoogleDriveClient::map_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(err.is_retryable());
    }
}
