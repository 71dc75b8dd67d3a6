//! In-memory tracking of background administrative tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::models::{Task, TaskType};

static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a task id unique within this process, e.g. `move-1718000000000-3`.
pub fn next_task_id(task_type: TaskType) -> String {
    let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", task_type, Utc::now().timestamp_millis(), seq)
}

/// Tasks announced by the current session, in start order.
#[derive(Debug, Default)]
pub struct TaskTracker {
    tasks: Vec<Task>,
    started: HashMap<String, Instant>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tracker with tasks loaded from storage.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            started: HashMap::new(),
        }
    }

    /// Register `task` as active. A task with the same id is replaced in place.
    pub fn start_task(&mut self, mut task: Task) {
        task.active = true;
        info!(id = %task.id, kind = %task.task_type, "task started");
        self.started.insert(task.id.clone(), Instant::now());
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    /// Mark a task as finished and record how long it ran. Unknown ids are
    /// ignored.
    pub fn complete_task(&mut self, id: &str) {
        let started = self.started.remove(id);
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                if let Some(started) = started {
                    task.time = task.time.max(started.elapsed().as_secs());
                }
                task.active = false;
                info!(id, elapsed = task.time, "task completed");
            }
            None => debug!(id, "complete_task: unknown task"),
        }
    }

    /// Advance the elapsed-time counter of an active task.
    pub fn tick(&mut self, id: &str, secs: u64) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id && t.active) {
            task.time += secs;
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.active).count()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}
