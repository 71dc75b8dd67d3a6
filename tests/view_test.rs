//! Folder view behaviour against an in-memory Drive.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use school_drive::client::{FileUpdate, RemoteStore};
use school_drive::error::{DriveError, Result};
use school_drive::models::{Destination, Hr, MetaPatch, Student, TaskType};
use school_drive::notify::{Level, MemoryNotifier};
use school_drive::store::Command;
use school_drive::{FolderView, LoadOutcome, TaskTracker};
use serde_json::{json, Value};

fn raw_file(id: &str, name: &str, parent: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "mimeType": "application/pdf",
        "thumbnailLink": null,
        "parents": [parent],
        "appProperties": {"source": "scanner"},
        "createdTime": "2024-04-01T09:00:00Z",
        "modifiedTime": "2024-04-02T09:00:00Z"
    })
}

/// Drive stand-in: serves a fixed listing and applies updates to it.
#[derive(Default)]
struct FakeDrive {
    files: Mutex<HashMap<String, Value>>,
    listing: Mutex<Option<Value>>,
    offline: bool,
    failing: HashSet<String>,
    garbled: HashSet<String>,
    updates: Mutex<Vec<(String, FileUpdate)>>,
}

impl FakeDrive {
    fn with_files(files: Vec<Value>) -> Self {
        let drive = FakeDrive::default();
        {
            let mut map = drive.files.lock().unwrap();
            for file in &files {
                map.insert(file["id"].as_str().unwrap().to_string(), file.clone());
            }
        }
        *drive.listing.lock().unwrap() = Some(Value::Array(files));
        drive
    }

    fn serve_listing(&self, listing: Value) {
        *self.listing.lock().unwrap() = Some(listing);
    }

    fn updates(&self) -> Vec<(String, FileUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

fn unavailable() -> DriveError {
    DriveError::ApiError {
        status: 503,
        message: "backend unavailable".to_string(),
    }
}

impl RemoteStore for FakeDrive {
    async fn list_files(&self, _folder_id: &str) -> Result<Value> {
        if self.offline {
            return Err(unavailable());
        }
        Ok(self.listing.lock().unwrap().clone().unwrap_or(json!([])))
    }

    async fn update_properties(&self, file_id: &str, update: &FileUpdate) -> Result<Value> {
        self.updates
            .lock()
            .unwrap()
            .push((file_id.to_string(), update.clone()));
        if self.failing.contains(file_id) {
            return Err(unavailable());
        }
        if self.garbled.contains(file_id) {
            return Ok(json!({"id": file_id}));
        }

        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(file_id).ok_or(DriveError::ApiError {
            status: 404,
            message: format!("File not found: {}", file_id),
        })?;
        if let Some(name) = &update.name {
            file["name"] = json!(name);
        }
        if let Some(props) = &update.app_properties {
            file["appProperties"] = json!(props);
        }
        if !update.add_parents.is_empty() {
            file["parents"] = json!(update.add_parents);
        }
        file["modifiedTime"] = json!("2024-05-01T00:00:00Z");
        Ok(file.clone())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        if self.failing.contains(file_id) {
            return Err(unavailable());
        }
        self.files.lock().unwrap().remove(file_id);
        Ok(())
    }
}

fn hanako() -> Student {
    Student {
        gakunen: 2,
        hr: Hr::B,
        hr_no: 7,
        family_name: "山田".to_string(),
        given_name: "花子".to_string(),
        email: Some("hanako@example.com".to_string()),
    }
}

async fn loaded<'n>(
    drive: FakeDrive,
    notifier: &'n MemoryNotifier,
) -> FolderView<FakeDrive, &'n MemoryNotifier> {
    let mut view = FolderView::new(drive, notifier);
    let outcome = view.load("p1", false).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded(_)));
    view
}

mod loading {
    use super::*;

    #[tokio::test]
    async fn test_load_selects_and_keeps_remote_fields() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "a.pdf", "p1")]);
        let mut view = FolderView::new(drive, &notifier);

        let outcome = view.load("p1", true).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded(1)));
        assert_eq!(view.folder_id(), Some("p1"));

        let record = view.collection().get("f1").unwrap();
        assert!(record.meta.selected);
        assert_eq!(record.name, "a.pdf");
        assert_eq!(record.mime_type, "application/pdf");
        assert_eq!(record.parents, vec!["p1".to_string()]);
        assert_eq!(record.thumbnail_link, None);
        assert_eq!(record.properties().get("source").map(String::as_str), Some("scanner"));
        assert_eq!(record.created_time.to_rfc3339(), "2024-04-01T09:00:00+00:00");
    }

    #[tokio::test]
    async fn test_malformed_listing_leaves_store_untouched() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![
            raw_file("f1", "a.pdf", "p1"),
            raw_file("f2", "b.pdf", "p1"),
        ]);
        let mut view = loaded(drive, &notifier).await;
        let before = view.collection().snapshot();

        let mut broken = raw_file("f3", "c.pdf", "p1");
        broken.as_object_mut().unwrap().remove("id");
        view.remote().serve_listing(json!([broken]));

        let outcome = view.load("p1", true).await.unwrap();
        match outcome {
            LoadOutcome::Rejected(failure) => assert!(failure.has_issue_at("[0].id")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(view.collection().len(), 2);
        assert!(std::sync::Arc::ptr_eq(&before, &view.collection().snapshot()));

        let messages = notifier.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Level::Error);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive {
            offline: true,
            ..FakeDrive::default()
        };
        let mut view = FolderView::new(drive, &notifier);

        let err = view.load("p1", true).await.unwrap_err();
        assert!(err.is_transport());
        assert!(view.collection().is_empty());
        assert_eq!(view.folder_id(), None);
        assert!(notifier.drain().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_silent() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "a.pdf", "p1")]);
        let mut view = loaded(drive, &notifier).await;

        let changed = view.dispatch(Command::UpdateOne {
            id: "missing".to_string(),
            patch: MetaPatch::default().selected(true),
        });
        assert!(!changed);
        assert!(!view.collection().get("f1").unwrap().meta.selected);
    }
}

mod committing {
    use super::*;

    #[tokio::test]
    async fn test_nothing_selected_nothing_pushed() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "a.pdf", "p1")]);
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        let report = view.commit(&mut tracker).await.unwrap();
        assert_eq!(report.task_id, None);
        assert!(tracker.tasks().is_empty());
        assert!(view.remote().updates().is_empty());
    }

    #[tokio::test]
    async fn test_tags_are_written_to_app_properties() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "a.pdf", "p1")]);
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        view.stage_tags("f1", vec!["面談".to_string(), "2学期".to_string()]);
        let report = view.commit(&mut tracker).await.unwrap();

        assert_eq!(report.updated, 1);
        let updates = view.remote().updates();
        assert_eq!(updates.len(), 1);
        let props = updates[0].1.app_properties.clone().unwrap();
        assert_eq!(props.get("tags").map(String::as_str), Some("面談,2学期"));
        assert_eq!(props.get("source").map(String::as_str), Some("scanner"));
        assert!(updates[0].1.name.is_none());

        let record = view.collection().get("f1").unwrap();
        assert_eq!(record.properties().get("tags").map(String::as_str), Some("面談,2学期"));
        assert!(!record.meta.selected);
        assert!(record.meta.tags.is_empty());

        let task = tracker.get(report.task_id.as_deref().unwrap()).unwrap();
        assert_eq!(task.task_type, TaskType::Rename);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_move_then_undo() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![
            raw_file("f1", "a.pdf", "p1"),
            raw_file("f2", "b.pdf", "p1"),
        ]);
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        view.stage_move(&["f1".to_string()], Destination::new("p2", "2024年度"));
        let report = view.commit(&mut tracker).await.unwrap();

        let task = tracker.get(report.task_id.as_deref().unwrap()).unwrap();
        assert_eq!(task.task_type, TaskType::Move);
        assert_eq!(task.files.as_ref().map(Vec::len), Some(1));

        let moved = view.collection().get("f1").unwrap();
        assert_eq!(moved.parents, vec!["p2".to_string()]);
        assert_eq!(moved.meta.last.as_deref(), Some("p1"));
        assert_eq!(view.collection().get("f2").unwrap().parents, vec!["p1".to_string()]);

        assert!(view.stage_undo("f1"));
        assert!(!view.stage_undo("f2"));
        let pending = view.pending_updates();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.add_parents, vec!["p1".to_string()]);
        assert_eq!(pending[0].1.remove_parents, vec!["p2".to_string()]);
    }

    #[tokio::test]
    async fn test_rename_after_student() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "scan0001.pdf", "p1")]);
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        let proposed = view.stage_rename("f1", &hanako(), 2024).unwrap();
        assert_eq!(proposed, "2024_2B07_山田花子.pdf");
        assert_eq!(view.stage_rename("missing", &hanako(), 2024), None);

        view.commit(&mut tracker).await.unwrap();

        let updates = view.remote().updates();
        let (_, update) = &updates[0];
        assert_eq!(update.name.as_deref(), Some("2024_2B07_山田花子.pdf"));
        let props = update.app_properties.as_ref().unwrap();
        assert_eq!(props.get("formerName").map(String::as_str), Some("scan0001.pdf"));
        assert_eq!(props.get("email").map(String::as_str), Some("hanako@example.com"));
        assert_eq!(props.get("nendo").map(String::as_str), Some("2024"));

        assert_eq!(view.collection().get("f1").unwrap().name, "2024_2B07_山田花子.pdf");
    }

    #[tokio::test]
    async fn test_rename_keeps_committed_tags() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "scan0001.pdf", "p1")]);
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        view.stage_tags("f1", vec!["面談".to_string()]);
        view.commit(&mut tracker).await.unwrap();
        assert!(view.collection().get("f1").unwrap().meta.tags.is_empty());

        let proposed = view.stage_rename("f1", &hanako(), 2024).unwrap();
        assert_eq!(proposed, "2024_2B07_山田花子_面談.pdf");
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_echoes() {
        let notifier = MemoryNotifier::new();
        let mut drive = FakeDrive::with_files(vec![
            raw_file("f1", "a.pdf", "p1"),
            raw_file("f2", "b.pdf", "p1"),
        ]);
        drive.failing.insert("f2".to_string());
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        view.stage_tags("f1", vec!["x".to_string()]);
        view.stage_tags("f2", vec!["y".to_string()]);

        let err = view.commit(&mut tracker).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(tracker.active_count(), 0);

        let f1 = view.collection().get("f1").unwrap();
        assert_eq!(f1.properties().get("tags").map(String::as_str), Some("x"));
        let f2 = view.collection().get("f2").unwrap();
        assert!(f2.meta.selected);
        assert_eq!(f2.meta.tags, vec!["y".to_string()]);
    }

    #[tokio::test]
    async fn test_garbled_echo_is_reported() {
        let notifier = MemoryNotifier::new();
        let mut drive = FakeDrive::with_files(vec![raw_file("f1", "a.pdf", "p1")]);
        drive.garbled.insert("f1".to_string());
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        view.stage_tags("f1", vec!["x".to_string()]);
        let report = view.commit(&mut tracker).await.unwrap();

        assert_eq!(report.updated, 0);
        assert_eq!(report.rejected, 1);
        assert_eq!(notifier.drain()[0].0, Level::Warning);
        assert_eq!(view.collection().get("f1").unwrap().name, "a.pdf");
    }

    #[tokio::test]
    async fn test_delete_selected_keeps_failures() {
        let notifier = MemoryNotifier::new();
        let mut drive = FakeDrive::with_files(vec![
            raw_file("f1", "a.pdf", "p1"),
            raw_file("f2", "b.pdf", "p1"),
            raw_file("f3", "c.pdf", "p1"),
        ]);
        drive.failing.insert("f3".to_string());
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        view.dispatch(Command::SetSelectedAll(true));
        view.dispatch(Command::UpdateOne {
            id: "f2".to_string(),
            patch: MetaPatch::default().selected(false),
        });

        let err = view.delete_selected(&mut tracker).await.unwrap_err();
        assert!(err.is_transport());

        let remaining: Vec<String> = view.collection().records().map(|r| r.id.clone()).collect();
        assert_eq!(remaining, vec!["f2", "f3"]);
        assert_eq!(tracker.tasks()[0].task_type, TaskType::Delete);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_without_selection() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "a.pdf", "p1")]);
        let mut view = loaded(drive, &notifier).await;
        let mut tracker = TaskTracker::new();

        assert_eq!(view.delete_selected(&mut tracker).await.unwrap(), 0);
        assert_eq!(view.collection().len(), 1);
        assert!(tracker.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_dispose_returns_last_snapshot() {
        let notifier = MemoryNotifier::new();
        let drive = FakeDrive::with_files(vec![raw_file("f1", "a.pdf", "p1")]);
        let view = loaded(drive, &notifier).await;
        assert_eq!(view.dispose().len(), 1);
    }
}
