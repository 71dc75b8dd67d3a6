//! A folder being worked on: its files, the staged edits, and the commit
//! that pushes them to Drive.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::client::{FileUpdate, RemoteStore};
use crate::error::Result;
use crate::models::{Destination, DriveFileRecord, FileMeta, MetaPatch, Student, Task, TaskType};
use crate::notify::{Level, Notifier};
use crate::rename::{proposed_name, rename_segments};
use crate::store::{Command, FileCollection, Snapshot};
use crate::tasks::{next_task_id, TaskTracker};
use crate::validation::{parse_drive_file, parse_drive_files, ValidationFailure};

/// Updates pushed to Drive at the same time during a commit.
const COMMIT_CONCURRENCY: usize = 4;

/// Result of [`FolderView::load`].
#[derive(Debug)]
pub enum LoadOutcome {
    /// The listing was accepted; holds the number of records.
    Loaded(usize),
    /// The listing did not validate and was discarded.
    Rejected(ValidationFailure),
}

/// What a commit did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub task_id: Option<String>,
    pub updated: usize,
    /// Files Drive accepted but whose echo failed validation.
    pub rejected: usize,
}

/// Changes that would be sent for `record`, based on its staged meta.
///
/// Tags, nendo, student email and the former name are written to
/// `appProperties`; empty staged values leave existing properties alone.
pub fn pending_update(record: &DriveFileRecord) -> FileUpdate {
    let meta = &record.meta;
    let mut update = FileUpdate::default();

    if let Some(name) = &meta.name {
        if name != &record.name {
            update.name = Some(name.clone());
        }
    }

    let current = record.properties();
    let mut props = current.clone();
    if !meta.tags.is_empty() {
        props.insert("tags".to_string(), meta.tags.join(","));
    }
    if let Some(nendo) = meta.nendo {
        props.insert("nendo".to_string(), nendo.to_string());
    }
    if let Some(email) = &meta.email {
        props.insert("email".to_string(), email.clone());
    }
    if update.name.is_some() {
        if let Some(former) = &meta.former_name {
            props.insert("formerName".to_string(), former.clone());
        }
    }
    if props != current {
        update.app_properties = Some(props);
    }

    if let Some(target) = &meta.destination.id {
        if !record.is_in(target) {
            update.add_parents = vec![target.clone()];
            update.remove_parents = record.parents.clone();
        }
    }

    update
}

/// Tags already saved on Drive, as written by `pending_update`.
fn committed_tags(record: &DriveFileRecord) -> Vec<String> {
    record
        .properties()
        .get("tags")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Working state of one folder view.
pub struct FolderView<R, N> {
    remote: R,
    notifier: N,
    folder_id: Option<String>,
    files: FileCollection,
}

impl<R: RemoteStore, N: Notifier> FolderView<R, N> {
    pub fn new(remote: R, notifier: N) -> Self {
        Self {
            remote,
            notifier,
            folder_id: None,
            files: FileCollection::new(),
        }
    }

    pub fn folder_id(&self) -> Option<&str> {
        self.folder_id.as_deref()
    }

    pub fn collection(&self) -> &FileCollection {
        &self.files
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn dispatch(&mut self, command: Command) -> bool {
        self.files.apply(command)
    }

    /// Fetch `folder_id` and replace the working set with its files.
    ///
    /// A network failure is returned as an error; a listing that fails
    /// validation is reported through the notifier. Neither touches the
    /// current working set.
    pub async fn load(&mut self, folder_id: &str, selected: bool) -> Result<LoadOutcome> {
        let raw = self.remote.list_files(folder_id).await?;

        match parse_drive_files(&raw) {
            Ok(records) => {
                let count = records.len();
                self.files.apply(Command::ReplaceAll { records, selected });
                self.folder_id = Some(folder_id.to_string());
                info!(folder_id, count, "folder loaded");
                Ok(LoadOutcome::Loaded(count))
            }
            Err(failure) => {
                warn!(folder_id, %failure, "folder listing rejected");
                self.notifier.notify(
                    Level::Error,
                    &format!("Could not read the file list for this folder ({})", failure),
                );
                Ok(LoadOutcome::Rejected(failure))
            }
        }
    }

    /// Select `ids` and stage a move to `destination`.
    pub fn stage_move(&mut self, ids: &[String], destination: Destination) {
        for id in ids {
            self.files.apply(Command::UpdateOne {
                id: id.clone(),
                patch: MetaPatch::default()
                    .selected(true)
                    .destination(destination.clone()),
            });
        }
    }

    pub fn stage_tags(&mut self, id: &str, tags: Vec<String>) {
        self.files.apply(Command::UpdateOne {
            id: id.to_string(),
            patch: MetaPatch::default().selected(true).tags(tags),
        });
    }

    /// Stage a rename that files the document under `student` for `nendo`.
    ///
    /// Returns the proposed name, or `None` if `id` is not in the view.
    pub fn stage_rename(&mut self, id: &str, student: &Student, nendo: i32) -> Option<String> {
        let record = self.files.get(id)?;
        let tags = if record.meta.tags.is_empty() {
            committed_tags(&record)
        } else {
            record.meta.tags.clone()
        };
        let segments = rename_segments(student, nendo, &tags);
        let former = record
            .meta
            .former_name
            .clone()
            .unwrap_or_else(|| record.name.clone());
        let name = proposed_name(&segments, &former);

        self.files.apply(Command::UpdateOne {
            id: id.to_string(),
            patch: MetaPatch::default()
                .selected(true)
                .segments(segments)
                .name(Some(name.clone()))
                .former_name(Some(former))
                .email(student.email.clone())
                .nendo(Some(nendo)),
        });
        Some(name)
    }

    /// Stage a move back to the folder a file was in before its last
    /// committed move. Returns `false` when there is nothing to undo.
    pub fn stage_undo(&mut self, id: &str) -> bool {
        let Some(last) = self.files.get(id).and_then(|r| r.meta.last.clone()) else {
            return false;
        };
        self.files.apply(Command::UpdateOne {
            id: id.to_string(),
            patch: MetaPatch::default().selected(true).destination(Destination {
                id: Some(last),
                name: None,
            }),
        })
    }

    /// Selected records with something to push, and what would be pushed.
    pub fn pending_updates(&self) -> Vec<(Arc<DriveFileRecord>, FileUpdate)> {
        self.files
            .selected()
            .into_iter()
            .map(|record| {
                let update = pending_update(&record);
                (record, update)
            })
            .filter(|(_, update)| !update.is_empty())
            .collect()
    }

    /// Push every pending change and swap in Drive's copies.
    ///
    /// The batch is tracked as one task in `tracker`. If a request fails,
    /// echoes that already arrived are still applied, the task is completed
    /// and the first error is returned.
    pub async fn commit(&mut self, tracker: &mut TaskTracker) -> Result<CommitReport> {
        let pending = self.pending_updates();
        if pending.is_empty() {
            debug!("commit: nothing to push");
            return Ok(CommitReport::default());
        }

        let task_type = if pending.iter().any(|(_, u)| u.is_move()) {
            TaskType::Move
        } else {
            TaskType::Rename
        };
        let task_id = next_task_id(task_type);
        let files = pending.iter().map(|(r, _)| DriveFileRecord::clone(r)).collect();
        tracker.start_task(Task::new(task_id.clone(), task_type).with_files(files));

        let remote = &self.remote;
        let results: Vec<_> = stream::iter(pending.iter())
            .map(|(record, update)| async move {
                remote.update_properties(&record.id, update).await
            })
            .buffered(COMMIT_CONCURRENCY)
            .collect()
            .await;

        let mut report = CommitReport {
            task_id: Some(task_id.clone()),
            ..CommitReport::default()
        };
        let mut first_error = None;

        for ((record, update), result) in pending.iter().zip(results) {
            let echo = match result {
                Ok(echo) => echo,
                Err(err) => {
                    warn!(file_id = %record.id, error = %err, "update failed");
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            match parse_drive_file(&echo) {
                Ok(mut fresh) => {
                    fresh.meta = FileMeta {
                        last: if update.is_move() {
                            record.parents.first().cloned()
                        } else {
                            record.meta.last.clone()
                        },
                        ..FileMeta::default()
                    };
                    self.files.apply(Command::ReplaceOne(fresh));
                    report.updated += 1;
                }
                Err(failure) => {
                    report.rejected += 1;
                    let message = format!(
                        "Drive returned an unexpected copy of {} ({})",
                        record.name, failure
                    );
                    self.notifier.notify(Level::Warning, &message);
                }
            }
        }

        tracker.complete_task(&task_id);
        match first_error {
            Some(err) => Err(err),
            None => {
                info!(task_id = %task_id, updated = report.updated, "commit finished");
                Ok(report)
            }
        }
    }

    /// Delete every selected file and drop it from the working set.
    ///
    /// Tracked as a delete task. Files whose deletion failed stay in the set;
    /// the first error is returned once the task is completed.
    pub async fn delete_selected(&mut self, tracker: &mut TaskTracker) -> Result<usize> {
        let selected = self.files.selected();
        if selected.is_empty() {
            return Ok(0);
        }

        let task_id = next_task_id(TaskType::Delete);
        let files = selected.iter().map(|r| DriveFileRecord::clone(r)).collect();
        tracker.start_task(Task::new(task_id.clone(), TaskType::Delete).with_files(files));

        let remote = &self.remote;
        let results: Vec<_> = stream::iter(selected.iter())
            .map(|record| async move { remote.delete_file(&record.id).await })
            .buffered(COMMIT_CONCURRENCY)
            .collect()
            .await;

        let mut deleted = Vec::new();
        let mut first_error = None;
        for (record, result) in selected.iter().zip(results) {
            match result {
                Ok(()) => deleted.push(record.id.clone()),
                Err(err) => {
                    warn!(file_id = %record.id, error = %err, "delete failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        let count = deleted.len();
        self.files.apply(Command::RemoveMany(deleted));
        tracker.complete_task(&task_id);
        match first_error {
            Some(err) => Err(err),
            None => {
                info!(task_id = %task_id, deleted = count, "delete finished");
                Ok(count)
            }
        }
    }

    /// Leave the view, handing back the final snapshot.
    pub fn dispose(self) -> Snapshot {
        self.files.dispose()
    }
}
