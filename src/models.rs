//! Data models for drive files, tasks, students and credentials.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mime type Google Drive uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// One file known to the system, as fetched from Google Drive.
///
/// Everything except `meta` mirrors the remote record. `meta` is local
/// workflow state and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub icon_link: Option<String>,
    pub thumbnail_link: Option<String>,
    pub web_view_link: Option<String>,
    pub parents: Vec<String>,
    pub app_properties: Option<String>,
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    #[serde(default)]
    pub views: u32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    #[serde(skip)]
    pub meta: FileMeta,
}

impl DriveFileRecord {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    /// Extension of the current name including the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        split_extension(&self.name).1
    }

    /// Decoded application properties. Malformed JSON yields an empty map.
    pub fn properties(&self) -> BTreeMap<String, String> {
        self.app_properties
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Whether the record lives directly inside `folder_id`.
    pub fn is_in(&self, folder_id: &str) -> bool {
        self.parents.iter().any(|p| p == folder_id)
    }
}

impl fmt::Display for DriveFileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.meta.selected { "*" } else { " " };
        write!(
            f,
            "{} {}\t{}\t{}\t{}",
            mark,
            self.id,
            self.modified_time.format("%Y-%m-%d %H:%M"),
            self.mime_type,
            self.name
        )
    }
}

/// Split `name` into stem and extension (with the leading dot).
///
/// Dotfiles such as `.env` have no extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(pos) => (&name[..pos], Some(&name[pos..])),
    }
}

/// Pending move target chosen in the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl Destination {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
    }
}

/// Local workflow state attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    pub selected: bool,
    pub destination: Destination,
    /// Container the file was in before its last committed move.
    pub last: Option<String>,
    pub segments: Vec<String>,
    /// Proposed new name.
    pub name: Option<String>,
    pub former_name: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub nendo: Option<i32>,
}

/// Partial update of a [`FileMeta`]. Only fields set to `Some` are written.
///
/// Nullable meta fields use `Option<Option<_>>` so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaPatch {
    pub selected: Option<bool>,
    pub destination: Option<Destination>,
    pub last: Option<Option<String>>,
    pub segments: Option<Vec<String>>,
    pub name: Option<Option<String>>,
    pub former_name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub nendo: Option<Option<i32>>,
}

impl MetaPatch {
    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = Some(selected);
        self
    }

    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn last(mut self, last: Option<String>) -> Self {
        self.last = Some(last);
        self
    }

    pub fn segments(mut self, segments: Vec<String>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = Some(name);
        self
    }

    pub fn former_name(mut self, former_name: Option<String>) -> Self {
        self.former_name = Some(former_name);
        self
    }

    pub fn email(mut self, email: Option<String>) -> Self {
        self.email = Some(email);
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn nendo(mut self, nendo: Option<i32>) -> Self {
        self.nendo = Some(nendo);
        self
    }

    /// Merge this patch into `meta`.
    pub fn merge_into(&self, meta: &mut FileMeta) {
        if let Some(selected) = self.selected {
            meta.selected = selected;
        }
        if let Some(destination) = &self.destination {
            meta.destination = destination.clone();
        }
        if let Some(last) = &self.last {
            meta.last = last.clone();
        }
        if let Some(segments) = &self.segments {
            meta.segments = segments.clone();
        }
        if let Some(name) = &self.name {
            meta.name = name.clone();
        }
        if let Some(former_name) = &self.former_name {
            meta.former_name = former_name.clone();
        }
        if let Some(email) = &self.email {
            meta.email = email.clone();
        }
        if let Some(tags) = &self.tags {
            meta.tags = tags.clone();
        }
        if let Some(nendo) = self.nendo {
            meta.nendo = nendo;
        }
    }
}

/// Kind of administrative batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Rename,
    Move,
    Create,
    Delete,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Rename => "rename",
            TaskType::Move => "move",
            TaskType::Create => "create",
            TaskType::Delete => "delete",
        }
    }

    /// Whether this kind of task operates over files (otherwise students).
    pub fn carries_files(&self) -> bool {
        !matches!(self, TaskType::Create)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked administrative batch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub active: bool,
    /// Seconds elapsed since the task started.
    pub time: u64,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<DriveFileRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub students: Option<Vec<Student>>,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            active: true,
            time: 0,
            task_type,
            files: None,
            students: None,
        }
    }

    pub fn with_files(mut self, files: Vec<DriveFileRecord>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_students(mut self, students: Vec<Student>) -> Self {
        self.students = Some(students);
        self
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active { "active" } else { "done" };
        let items = self
            .files
            .as_ref()
            .map(|f| f.len())
            .or_else(|| self.students.as_ref().map(|s| s.len()))
            .unwrap_or(0);
        write!(
            f,
            "{}\t{}\t{}\t{}s\t{} item(s)",
            self.id, self.task_type, state, self.time, items
        )
    }
}

/// Homeroom designator. `All` is a wildcard used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hr {
    A,
    B,
    C,
    D,
    E,
    F,
    #[serde(rename = "ALL")]
    All,
}

impl Hr {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Hr::A),
            "B" => Some(Hr::B),
            "C" => Some(Hr::C),
            "D" => Some(Hr::D),
            "E" => Some(Hr::E),
            "F" => Some(Hr::F),
            "ALL" => Some(Hr::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hr::A => "A",
            Hr::B => "B",
            Hr::C => "C",
            Hr::D => "D",
            Hr::E => "E",
            Hr::F => "F",
            Hr::All => "ALL",
        }
    }

    /// `self` used as a filter: `All` matches every homeroom.
    pub fn matches(&self, other: Hr) -> bool {
        *self == Hr::All || *self == other
    }
}

impl fmt::Display for Hr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A student, used as a grouping and filter key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub gakunen: u8,
    pub hr: Hr,
    pub hr_no: u16,
    pub family_name: String,
    pub given_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Student {
    /// Class code such as `2B07`.
    pub fn class_code(&self) -> String {
        format!("{}{}{:02}", self.gakunen, self.hr, self.hr_no)
    }

    pub fn full_name(&self) -> String {
        format!("{}{}", self.family_name, self.given_name)
    }

    /// Whether the student belongs to `gakunen` (any grade when `None`) and `hr`.
    pub fn in_class(&self, gakunen: Option<u8>, hr: Hr) -> bool {
        gakunen.map_or(true, |g| g == self.gakunen) && hr.matches(self.hr)
    }
}

/// OAuth token pair issued to a user by the external auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// View statistics kept for a file by the local database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub file_id: String,
    pub views: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl fmt::Display for FileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{} view(s)\tfirst {}\tlast {}",
            self.file_id,
            self.views,
            self.first_seen.format("%Y-%m-%d %H:%M"),
            self.last_seen.format("%Y-%m-%d %H:%M")
        )
    }
}

/// One page of the files.list API endpoint. Files stay untyped until they
/// pass validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    #[serde(default)]
    pub files: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}
