//! Shape checks for data crossing the network and database boundaries.
//!
//! Every parser walks an untyped [`serde_json::Value`] and either returns a
//! fully typed value or a [`ValidationFailure`] listing every problem found.
//! Parsers never panic and never stop at the first issue.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{Credential, DriveFileRecord, FileMeta, FileStats, Hr, Student, Task, TaskType};

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex")
});

/// Drive folder links: `/drive/folders/<ID>`, `/drive/u/0/folders/<ID>`, `open?id=<ID>`.
static FOLDER_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://drive\.google\.com/(?:drive/(?:u/\d+/)?folders/|open\?id=)([a-zA-Z0-9_-]+)",
    )
    .expect("Invalid folder link regex")
});

/// Highest grade accepted for a student.
const MAX_GAKUNEN: u64 = 12;

/// A single problem found in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Location inside the payload, e.g. `files[2].parents`. Empty for the root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A payload that did not match the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<Issue>,
}

impl ValidationFailure {
    fn single(path: &str, message: impl Into<String>) -> Self {
        Self {
            issues: vec![Issue {
                path: path.to_string(),
                message: message.into(),
            }],
        }
    }

    /// Whether any issue was reported at exactly `path`.
    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.issues.iter().map(Issue::to_string).collect();
        write!(f, "{} issue(s): {}", self.issues.len(), joined.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

pub type Validated<T> = std::result::Result<T, ValidationFailure>;

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn index(path: &str, i: usize) -> String {
    format!("{}[{}]", path, i)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Default)]
struct Checker {
    issues: Vec<Issue>,
}

type Obj = Map<String, Value>;

impl Checker {
    fn issue(&mut self, path: String, message: impl Into<String>) {
        self.issues.push(Issue {
            path,
            message: message.into(),
        });
    }

    fn finish<T>(self, value: Option<T>) -> Validated<T> {
        match value {
            Some(value) if self.issues.is_empty() => Ok(value),
            _ => Err(ValidationFailure {
                issues: if self.issues.is_empty() {
                    vec![Issue {
                        path: String::new(),
                        message: "invalid payload".to_string(),
                    }]
                } else {
                    self.issues
                },
            }),
        }
    }

    fn object<'v>(&mut self, value: &'v Value, path: &str) -> Option<&'v Obj> {
        match value {
            Value::Object(obj) => Some(obj),
            other => {
                self.issue(path.to_string(), format!("expected object, got {}", kind(other)));
                None
            }
        }
    }

    /// Present and not null.
    fn present<'v>(obj: &'v Obj, key: &str) -> Option<&'v Value> {
        obj.get(key).filter(|v| !v.is_null())
    }

    fn string(&mut self, obj: &Obj, path: &str, key: &str) -> Option<String> {
        let path = join(path, key);
        match Self::present(obj, key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::String(_)) => {
                self.issue(path, "must not be empty");
                None
            }
            Some(other) => {
                self.issue(path, format!("expected string, got {}", kind(other)));
                None
            }
            None => {
                self.issue(path, "required");
                None
            }
        }
    }

    fn opt_string(&mut self, obj: &Obj, path: &str, key: &str) -> Option<String> {
        match Self::present(obj, key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.issue(join(path, key), format!("expected string, got {}", kind(other)));
                None
            }
            None => None,
        }
    }

    fn id(&mut self, obj: &Obj, path: &str, key: &str) -> Option<String> {
        let id = self.string(obj, path, key)?;
        if ID_REGEX.is_match(&id) {
            Some(id)
        } else {
            self.issue(join(path, key), format!("invalid id {:?}", id));
            None
        }
    }

    fn opt_email(&mut self, obj: &Obj, path: &str, key: &str) -> Option<String> {
        let email = self.opt_string(obj, path, key)?;
        if EMAIL_REGEX.is_match(&email) {
            Some(email)
        } else {
            self.issue(join(path, key), format!("invalid email {:?}", email));
            None
        }
    }

    fn boolean(&mut self, obj: &Obj, path: &str, key: &str) -> Option<bool> {
        match Self::present(obj, key) {
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                self.issue(join(path, key), format!("expected boolean, got {}", kind(other)));
                None
            }
            None => {
                self.issue(join(path, key), "required");
                None
            }
        }
    }

    /// Non-negative integer. Drive encodes int64 values as strings, so
    /// numeric strings are accepted too.
    fn unsigned_value(&mut self, value: &Value, path: String) -> Option<u64> {
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse::<u64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.issue(path, format!("expected non-negative integer, got {}", value));
        }
        parsed
    }

    fn unsigned(&mut self, obj: &Obj, path: &str, key: &str) -> Option<u64> {
        match Self::present(obj, key) {
            Some(value) => self.unsigned_value(value, join(path, key)),
            None => {
                self.issue(join(path, key), "required");
                None
            }
        }
    }

    fn opt_unsigned(&mut self, obj: &Obj, path: &str, key: &str) -> Option<u64> {
        Self::present(obj, key).and_then(|value| self.unsigned_value(value, join(path, key)))
    }

    fn timestamp_value(&mut self, value: &Value, path: String) -> Option<DateTime<Utc>> {
        let parsed = value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        if parsed.is_none() {
            self.issue(path, format!("expected RFC 3339 timestamp, got {}", value));
        }
        parsed
    }

    fn timestamp(&mut self, obj: &Obj, path: &str, key: &str) -> Option<DateTime<Utc>> {
        match Self::present(obj, key) {
            Some(value) => self.timestamp_value(value, join(path, key)),
            None => {
                self.issue(join(path, key), "required");
                None
            }
        }
    }

    fn opt_timestamp(&mut self, obj: &Obj, path: &str, key: &str) -> Option<DateTime<Utc>> {
        Self::present(obj, key).and_then(|value| self.timestamp_value(value, join(path, key)))
    }

    fn array<'v>(&mut self, obj: &'v Obj, path: &str, key: &str) -> Option<&'v Vec<Value>> {
        match Self::present(obj, key) {
            Some(Value::Array(items)) => Some(items),
            Some(other) => {
                self.issue(join(path, key), format!("expected array, got {}", kind(other)));
                None
            }
            None => None,
        }
    }

    fn id_list(&mut self, obj: &Obj, path: &str, key: &str) -> Option<Vec<String>> {
        let Some(items) = self.array(obj, path, key) else {
            if Self::present(obj, key).is_none() {
                self.issue(join(path, key), "required");
            }
            return None;
        };
        let list_path = join(path, key);
        if items.is_empty() {
            self.issue(list_path, "must not be empty");
            return None;
        }
        let mut ids = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(id) if ID_REGEX.is_match(id) => ids.push(id.to_string()),
                _ => self.issue(index(&list_path, i), format!("invalid id {}", item)),
            }
        }
        (ids.len() == items.len()).then_some(ids)
    }

    /// Drive returns `appProperties` as an object of strings; the database
    /// stores it as JSON text. Both become the JSON text form.
    fn app_properties(&mut self, obj: &Obj, path: &str, key: &str) -> Option<String> {
        match Self::present(obj, key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(props)) => {
                let mut ok = true;
                for (name, value) in props {
                    if !value.is_string() {
                        self.issue(
                            join(&join(path, key), name),
                            format!("expected string, got {}", kind(value)),
                        );
                        ok = false;
                    }
                }
                if ok {
                    serde_json::to_string(props).ok()
                } else {
                    None
                }
            }
            Some(other) => {
                self.issue(join(path, key), format!("expected object, got {}", kind(other)));
                None
            }
            None => None,
        }
    }

    fn drive_file(&mut self, value: &Value, path: &str) -> Option<DriveFileRecord> {
        let obj = self.object(value, path)?;
        let id = self.id(obj, path, "id");
        let name = self.string(obj, path, "name");
        let mime_type = self.string(obj, path, "mimeType");
        let icon_link = self.opt_string(obj, path, "iconLink");
        let thumbnail_link = self.opt_string(obj, path, "thumbnailLink");
        let web_view_link = self.opt_string(obj, path, "webViewLink");
        let parents = self.id_list(obj, path, "parents");
        let app_properties = self.app_properties(obj, path, "appProperties");
        let created_time = self.timestamp(obj, path, "createdTime");
        let modified_time = self.timestamp(obj, path, "modifiedTime");
        let views = match self.opt_unsigned(obj, path, "views") {
            Some(v) => match u32::try_from(v) {
                Ok(v) => v,
                Err(_) => {
                    self.issue(join(path, "views"), "out of range");
                    0
                }
            },
            None => 0,
        };
        let first_seen = self.opt_timestamp(obj, path, "firstSeen");
        let last_seen = self.opt_timestamp(obj, path, "lastSeen");
        let user_id = self.opt_string(obj, path, "userId");

        Some(DriveFileRecord {
            id: id?,
            name: name?,
            mime_type: mime_type?,
            icon_link,
            thumbnail_link,
            web_view_link,
            parents: parents?,
            app_properties,
            created_time: created_time?,
            modified_time: modified_time?,
            views,
            first_seen,
            last_seen,
            user_id,
            meta: FileMeta::default(),
        })
    }

    fn drive_file_list(&mut self, items: &[Value], path: &str) -> Option<Vec<DriveFileRecord>> {
        let mut records = Vec::with_capacity(items.len());
        let mut seen = HashSet::new();
        for (i, item) in items.iter().enumerate() {
            let item_path = index(path, i);
            if let Some(record) = self.drive_file(item, &item_path) {
                if seen.insert(record.id.clone()) {
                    records.push(record);
                } else {
                    self.issue(join(&item_path, "id"), format!("duplicate id {:?}", record.id));
                }
            }
        }
        (records.len() == items.len()).then_some(records)
    }

    fn student(&mut self, value: &Value, path: &str) -> Option<Student> {
        let obj = self.object(value, path)?;
        let gakunen = self.unsigned(obj, path, "gakunen").and_then(|g| {
            if (1..=MAX_GAKUNEN).contains(&g) {
                Some(g as u8)
            } else {
                self.issue(join(path, "gakunen"), format!("must be between 1 and {}", MAX_GAKUNEN));
                None
            }
        });
        let hr = self.string(obj, path, "hr").and_then(|hr| {
            let parsed = Hr::parse(&hr);
            if parsed.is_none() {
                self.issue(join(path, "hr"), format!("expected one of A-F or ALL, got {:?}", hr));
            }
            parsed
        });
        let hr_no = self.unsigned(obj, path, "hrNo").and_then(|n| {
            match u16::try_from(n) {
                Ok(n) if n >= 1 => Some(n),
                _ => {
                    self.issue(join(path, "hrNo"), "must be a positive number");
                    None
                }
            }
        });
        let family_name = self.string(obj, path, "familyName");
        let given_name = self.string(obj, path, "givenName");
        let email = self.opt_email(obj, path, "email");

        Some(Student {
            gakunen: gakunen?,
            hr: hr?,
            hr_no: hr_no?,
            family_name: family_name?,
            given_name: given_name?,
            email,
        })
    }

    fn task(&mut self, value: &Value, path: &str) -> Option<Task> {
        let obj = self.object(value, path)?;
        let id = self.string(obj, path, "id");
        let active = self.boolean(obj, path, "active");
        let time = self.unsigned(obj, path, "time");
        let task_type = self.string(obj, path, "type").and_then(|t| {
            let parsed = match t.as_str() {
                "rename" => Some(TaskType::Rename),
                "move" => Some(TaskType::Move),
                "create" => Some(TaskType::Create),
                "delete" => Some(TaskType::Delete),
                _ => None,
            };
            if parsed.is_none() {
                self.issue(
                    join(path, "type"),
                    format!("expected rename, move, create or delete, got {:?}", t),
                );
            }
            parsed
        });

        let files_path = join(path, "files");
        let files = self
            .array(obj, path, "files")
            .map(|items| self.drive_file_list(items, &files_path));
        let students_path = join(path, "students");
        let students = self.array(obj, path, "students").map(|items| {
            let parsed: Vec<Option<Student>> = items
                .iter()
                .enumerate()
                .map(|(i, item)| self.student(item, &index(&students_path, i)))
                .collect();
            parsed.into_iter().collect::<Option<Vec<_>>>()
        });

        if let Some(task_type) = task_type {
            if task_type.carries_files() && files.is_none() {
                self.issue(files_path, format!("required for {} task", task_type));
            } else if !task_type.carries_files() && students.is_none() {
                self.issue(students_path, format!("required for {} task", task_type));
            }
        }

        Some(Task {
            id: id?,
            active: active?,
            time: time?,
            task_type: task_type?,
            files: match files {
                Some(files) => Some(files?),
                None => None,
            },
            students: match students {
                Some(students) => Some(students?),
                None => None,
            },
        })
    }
}

/// Validate one Drive file record.
pub fn parse_drive_file(value: &Value) -> Validated<DriveFileRecord> {
    let mut checker = Checker::default();
    let record = checker.drive_file(value, "");
    checker.finish(record)
}

/// Validate a file listing: either a bare array or a `{ "files": [...] }` page.
///
/// Ids must be unique within the listing.
pub fn parse_drive_files(value: &Value) -> Validated<Vec<DriveFileRecord>> {
    let mut checker = Checker::default();
    let records = match value {
        Value::Array(items) => checker.drive_file_list(items, ""),
        Value::Object(obj) => match obj.get("files") {
            Some(Value::Array(items)) => checker.drive_file_list(items, "files"),
            _ => {
                checker.issue("files".to_string(), "required");
                None
            }
        },
        other => {
            checker.issue(String::new(), format!("expected array, got {}", kind(other)));
            None
        }
    };
    checker.finish(records)
}

pub fn parse_student(value: &Value) -> Validated<Student> {
    let mut checker = Checker::default();
    let student = checker.student(value, "");
    checker.finish(student)
}

/// Validate a task. The task type decides which payload must be present.
pub fn parse_task(value: &Value) -> Validated<Task> {
    let mut checker = Checker::default();
    let task = checker.task(value, "");
    checker.finish(task)
}

pub fn parse_credential(value: &Value) -> Validated<Credential> {
    let mut checker = Checker::default();
    let credential = checker.object(value, "").and_then(|obj| {
        let user_id = checker.string(obj, "", "userId");
        let access_token = checker.string(obj, "", "accessToken");
        let refresh_token = checker.string(obj, "", "refreshToken");
        let expires_at = checker.timestamp(obj, "", "expiresAt");
        let refresh_expires_at = checker.opt_timestamp(obj, "", "refreshExpiresAt");
        Some(Credential {
            user_id: user_id?,
            access_token: access_token?,
            refresh_token: refresh_token?,
            expires_at: expires_at?,
            refresh_expires_at,
        })
    });
    checker.finish(credential)
}

pub fn parse_file_stats(value: &Value) -> Validated<FileStats> {
    let mut checker = Checker::default();
    let stats = checker.object(value, "").and_then(|obj| {
        let file_id = checker.id(obj, "", "fileId");
        let views = checker.unsigned(obj, "", "views").and_then(|v| {
            let parsed = u32::try_from(v).ok();
            if parsed.is_none() {
                checker.issue("views".to_string(), "out of range");
            }
            parsed
        });
        let first_seen = checker.timestamp(obj, "", "firstSeen");
        let last_seen = checker.timestamp(obj, "", "lastSeen");
        if let (Some(first), Some(last)) = (first_seen, last_seen) {
            if last < first {
                checker.issue("lastSeen".to_string(), "earlier than firstSeen");
            }
        }
        Some(FileStats {
            file_id: file_id?,
            views: views?,
            first_seen: first_seen?,
            last_seen: last_seen?,
        })
    });
    checker.finish(stats)
}

/// Accept a Drive folder link or a bare folder id and return the id.
///
/// ```
/// use school_drive::validation::parse_folder_ref;
///
/// let id = parse_folder_ref("https://drive.google.com/drive/u/0/folders/1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// assert_eq!(parse_folder_ref("1abc123").unwrap(), "1abc123");
/// ```
pub fn parse_folder_ref(input: &str) -> Validated<String> {
    let trimmed = input.trim();
    if let Some(id) = FOLDER_LINK_REGEX
        .captures(trimmed)
        .and_then(|c| c.get(1))
    {
        return Ok(id.as_str().to_string());
    }
    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }
    Err(ValidationFailure::single(
        "",
        format!("not a folder link or id: {:?}", input),
    ))
}
