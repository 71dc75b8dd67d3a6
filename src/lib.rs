//! school_drive - Organize student documents stored in Google Drive.
//!
//! This library provides:
//! - A copy-on-write working set of drive files with staged edits
//!   (select, tag, rename, move)
//! - Tracking of background batch tasks
//! - Validation of every payload coming from Drive or the local database
//! - A thin Drive API client and an SQLite store for credentials, tasks and
//!   view counters
//!
//! # Example
//!
//! ```no_run
//! use school_drive::{Authenticator, DriveClient, FolderView, TaskTracker, TracingNotifier};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = Authenticator::from_file("service-account.json")?;
//!     let client = DriveClient::new(auth);
//!     let mut view = FolderView::new(client, TracingNotifier);
//!
//!     view.load("folder-id", false).await?;
//!     view.stage_tags("file-id", vec!["面談".to_string()]);
//!
//!     let mut tasks = TaskTracker::new();
//!     let report = view.commit(&mut tasks).await?;
//!     println!("updated {} file(s)", report.updated);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod folders;
pub mod models;
pub mod notify;
pub mod rename;
pub mod repository;
pub mod store;
pub mod tasks;
pub mod validation;
pub mod view;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::{DriveClient, FileUpdate, RemoteStore};
pub use error::{DriveError, Result};
pub use models::{DriveFileRecord, MetaPatch, Student, Task, TaskType};
pub use notify::{Notifier, TracingNotifier};
pub use repository::Repository;
pub use store::{Command, FileCollection};
pub use tasks::TaskTracker;
pub use validation::ValidationFailure;
pub use view::{FolderView, LoadOutcome};
