//! Google Drive API client.
//!
//! Responses are handed back as raw JSON; callers run them through
//! [`crate::validation`] before they reach a store.

use std::collections::BTreeMap;
use std::future::Future;

use reqwest::{Client, Response};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, FileListPage, FOLDER_MIME};

/// Base URL for Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested for every file.
const FILE_FIELDS: &str = "id, name, mimeType, iconLink, thumbnailLink, webViewLink, parents, \
                           appProperties, createdTime, modifiedTime";

/// Changes to push for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub app_properties: Option<BTreeMap<String, String>>,
    pub add_parents: Vec<String>,
    pub remove_parents: Vec<String>,
}

impl FileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.app_properties.is_none()
            && self.add_parents.is_empty()
            && self.remove_parents.is_empty()
    }

    pub fn is_move(&self) -> bool {
        !self.add_parents.is_empty()
    }

    fn body(&self) -> Value {
        let mut body = Map::new();
        if let Some(name) = &self.name {
            body.insert("name".to_string(), json!(name));
        }
        if let Some(props) = &self.app_properties {
            body.insert("appProperties".to_string(), json!(props));
        }
        Value::Object(body)
    }
}

/// Remote file storage as seen by a folder view.
pub trait RemoteStore {
    /// All non-trashed children of `folder_id`, as a JSON array.
    fn list_files(&self, folder_id: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Apply `update` to a file and return the updated file.
    fn update_properties(
        &self,
        file_id: &str,
        update: &FileUpdate,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Delete a file. A file that is already gone counts as deleted.
    fn delete_file(&self, file_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Client for the Drive v3 files API.
pub struct DriveClient {
    base_url: String,
    drive_id: Option<String>,
    auth: Authenticator,
    http: Client,
}

impl DriveClient {
    /// Create a client working on the user's own drive.
    pub fn new(auth: Authenticator) -> Self {
        Self {
            base_url: DRIVE_API_BASE.to_string(),
            drive_id: None,
            auth,
            http: Client::new(),
        }
    }

    /// Restrict listings to one Shared Drive.
    pub fn with_shared_drive(mut self, drive_id: impl Into<String>) -> Self {
        self.drive_id = Some(drive_id.into());
        self
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn drive_id(&self) -> Option<&str> {
        self.drive_id.as_deref()
    }

    /// Query files using Google Drive query syntax. Follows every page.
    pub async fn query_files(&self, query: &str) -> Result<Vec<Value>> {
        let token = self.auth.get_access_token().await?;
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.base_url))
                .bearer_auth(&token)
                .query(&[
                    ("q", query),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                    ("spaces", "drive"),
                    ("fields", fields.as_str()),
                ]);

            if let Some(drive_id) = &self.drive_id {
                request = request.query(&[("driveId", drive_id.as_str()), ("corpora", "drive")]);
            }
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check(request.send().await?).await?;
            let page: FileListPage = response.json().await?;
            debug!(count = page.files.len(), "received file page");
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// Create a folder under `parent_id`.
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<Value> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent_id],
            }))
            .send()
            .await?;

        let created = check(response).await?.json().await?;
        info!(name, parent_id, "created folder");
        Ok(created)
    }
}

impl RemoteStore for DriveClient {
    async fn list_files(&self, folder_id: &str) -> Result<Value> {
        let query = format!(
            "'{}' in parents and trashed = false",
            folder_id.replace('\'', "\\'")
        );
        Ok(Value::Array(self.query_files(&query).await?))
    }

    async fn update_properties(&self, file_id: &str, update: &FileUpdate) -> Result<Value> {
        let token = self.auth.get_access_token().await?;
        let add_parents = update.add_parents.join(",");
        let remove_parents = update.remove_parents.join(",");

        let mut request = self
            .http
            .patch(format!("{}/files/{}", self.base_url, file_id))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)]);
        if !add_parents.is_empty() {
            request = request.query(&[("addParents", add_parents.as_str())]);
        }
        if !remove_parents.is_empty() {
            request = request.query(&[("removeParents", remove_parents.as_str())]);
        }

        let response = request.json(&update.body()).send().await?;
        let echo = check(response).await?.json().await?;
        info!(file_id, moved = update.is_move(), "updated file");
        Ok(echo)
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .delete(format!("{}/files/{}", self.base_url, file_id))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            debug!(file_id, "delete: file already gone");
            return Ok(());
        }
        check(response).await?;
        info!(file_id, "deleted file");
        Ok(())
    }
}

/// Turn a non-success response into [`DriveError::ApiError`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}
