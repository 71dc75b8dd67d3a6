//! Working set of drive file records for one view.
//!
//! All updates go through [`FileCollection::apply`]. Each command is reduced
//! by the pure function [`reduce`] into a fresh snapshot; records a command
//! does not touch are shared with the previous snapshot, touched records are
//! cloned before they are modified. A reader holding an old [`Snapshot`]
//! therefore never observes a partial write.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::models::{DriveFileRecord, MetaPatch};

/// Immutable view of the working set at one point in time.
pub type Snapshot = Arc<Vec<Arc<DriveFileRecord>>>;

/// One update of the working set.
#[derive(Debug, Clone)]
pub enum Command {
    /// Replace the whole set with freshly validated records.
    ReplaceAll {
        records: Vec<DriveFileRecord>,
        selected: bool,
    },
    SetSelectedAll(bool),
    /// Merge a meta patch into one record. Unknown ids are ignored.
    UpdateOne { id: String, patch: MetaPatch },
    /// Drop every record whose id is listed, keeping the order of the rest.
    RemoveMany(Vec<String>),
    /// Swap in the server's copy of a record after a commit. Unknown ids are
    /// ignored.
    ReplaceOne(DriveFileRecord),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::ReplaceAll { .. } => "replace_all",
            Command::SetSelectedAll(_) => "set_selected_all",
            Command::UpdateOne { .. } => "update_one",
            Command::RemoveMany(_) => "remove_many",
            Command::ReplaceOne(_) => "replace_one",
        }
    }
}

/// Compute the set that results from applying `command` to `current`.
///
/// Returns `None` when the command leaves the set unchanged.
pub fn reduce(
    current: &[Arc<DriveFileRecord>],
    command: Command,
) -> Option<Vec<Arc<DriveFileRecord>>> {
    match command {
        Command::ReplaceAll { records, selected } => Some(
            records
                .into_iter()
                .map(|mut record| {
                    record.meta.selected = selected;
                    Arc::new(record)
                })
                .collect(),
        ),

        Command::SetSelectedAll(selected) => {
            if current.iter().all(|r| r.meta.selected == selected) {
                return None;
            }
            Some(
                current
                    .iter()
                    .map(|record| {
                        if record.meta.selected == selected {
                            Arc::clone(record)
                        } else {
                            let mut copy = DriveFileRecord::clone(record);
                            copy.meta.selected = selected;
                            Arc::new(copy)
                        }
                    })
                    .collect(),
            )
        }

        Command::UpdateOne { id, patch } => {
            let pos = current.iter().position(|r| r.id == id)?;
            let mut copy = DriveFileRecord::clone(&current[pos]);
            patch.merge_into(&mut copy.meta);
            let mut next = current.to_vec();
            next[pos] = Arc::new(copy);
            Some(next)
        }

        Command::RemoveMany(ids) => {
            let ids: HashSet<String> = ids.into_iter().collect();
            if !current.iter().any(|r| ids.contains(&r.id)) {
                return None;
            }
            Some(
                current
                    .iter()
                    .filter(|r| !ids.contains(&r.id))
                    .cloned()
                    .collect(),
            )
        }

        Command::ReplaceOne(record) => {
            let pos = current.iter().position(|r| r.id == record.id)?;
            let mut next = current.to_vec();
            next[pos] = Arc::new(record);
            Some(next)
        }
    }
}

/// Owner of the working set. There is exactly one writer: whoever holds the
/// `&mut FileCollection`.
#[derive(Debug, Default)]
pub struct FileCollection {
    state: Snapshot,
}

impl FileCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command. Returns `true` if the set changed.
    pub fn apply(&mut self, command: Command) -> bool {
        let name = command.name();
        match reduce(&self.state, command) {
            Some(next) => {
                self.state = Arc::new(next);
                debug!(command = name, len = self.state.len(), "file collection updated");
                true
            }
            None => {
                debug!(command = name, "file collection unchanged");
                false
            }
        }
    }

    /// Current snapshot. Later commands never modify it.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.state)
    }

    pub fn get(&self, id: &str) -> Option<Arc<DriveFileRecord>> {
        self.state.iter().find(|r| r.id == id).cloned()
    }

    pub fn records(&self) -> impl Iterator<Item = &DriveFileRecord> {
        self.state.iter().map(|r| r.as_ref())
    }

    pub fn selected(&self) -> Vec<Arc<DriveFileRecord>> {
        self.state
            .iter()
            .filter(|r| r.meta.selected)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Tear down the store, handing back the last snapshot.
    pub fn dispose(self) -> Snapshot {
        debug!(len = self.state.len(), "file collection disposed");
        self.state
    }
}
