//! school_drive CLI - File student documents in Google Drive.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use school_drive::folders::create_student_folders;
use school_drive::models::{Destination, Hr, MetaPatch};
use school_drive::store::Command;
use school_drive::validation::{parse_credential, parse_folder_ref, parse_student};
use school_drive::{
    Authenticator, DriveClient, FolderView, LoadOutcome, Repository, TaskTracker, TracingNotifier,
};

/// CLI tool for filing student documents in Google Drive.
#[derive(Parser)]
#[command(name = "school_drive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to service account JSON credentials file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Act as this staff user, using the credential stored in the database.
    #[arg(long, env = "SCHOOL_DRIVE_USER")]
    user: Option<String>,

    /// Shared Drive ID; omit to work on the user's own drive.
    #[arg(long, env = "SHARED_DRIVE_ID")]
    drive_id: Option<String>,

    /// SQLite database holding credentials, tasks and view counters.
    #[arg(long, env = "SCHOOL_DRIVE_DB", default_value = "school_drive.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in a folder.
    List {
        /// Folder URL or ID.
        folder: String,
    },

    /// Set tags on a file.
    Tag {
        /// Folder URL or ID containing the file.
        folder: String,

        /// File ID.
        file: String,

        /// Tags to store on the file.
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Rename a file after the student it belongs to.
    Rename {
        /// Folder URL or ID containing the file.
        folder: String,

        /// File ID.
        file: String,

        /// School year the document belongs to.
        #[arg(long)]
        nendo: i32,

        /// Grade.
        #[arg(long)]
        gakunen: u8,

        /// Homeroom (A-F).
        #[arg(long)]
        hr: String,

        /// Number within the homeroom.
        #[arg(long)]
        hr_no: u16,

        #[arg(long)]
        family_name: String,

        #[arg(long)]
        given_name: String,

        #[arg(long)]
        email: Option<String>,

        /// Only show the proposed name.
        #[arg(long)]
        dry_run: bool,
    },

    /// Move files to another folder.
    Move {
        /// Folder URL or ID containing the files.
        folder: String,

        /// File IDs to move.
        #[arg(required = true)]
        files: Vec<String>,

        /// Destination folder URL or ID.
        #[arg(long, short = 't')]
        to: String,
    },

    /// Delete files from a folder.
    Delete {
        /// Folder URL or ID containing the files.
        folder: String,

        /// File IDs to delete.
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Create one folder per student (students read from a JSON array).
    CreateFolders {
        /// Parent folder URL or ID.
        parent: String,

        /// JSON file with the student list.
        #[arg(long)]
        students: PathBuf,

        /// Only this grade.
        #[arg(long)]
        gakunen: Option<u8>,

        /// Only this homeroom (A-F, or ALL).
        #[arg(long, default_value = "ALL")]
        hr: String,
    },

    /// Show tasks recorded in the database.
    Tasks,

    /// Show view statistics of a file.
    Stats {
        /// File ID.
        file: String,
    },

    /// Store a credential issued by the sign-in service (JSON file).
    ImportCredential {
        path: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,school_drive=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let repo = Repository::open(&cli.database)
        .with_context(|| format!("Failed to open database {:?}", cli.database))?;

    // Commands that do not talk to Drive
    match &cli.command {
        Commands::Tasks => {
            let tasks = repo.tasks().context("Failed to read tasks")?;
            if tasks.is_empty() {
                println!("No tasks recorded.");
            }
            for task in tasks {
                println!("{}", task);
            }
            return Ok(());
        }
        Commands::Stats { file } => {
            match repo.file_stats(file).context("Failed to read statistics")? {
                Some(stats) => println!("{}", stats),
                None => println!("No statistics for {}.", file),
            }
            return Ok(());
        }
        Commands::ImportCredential { path } => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let value = serde_json::from_str(&content).context("Credential is not JSON")?;
            let credential = parse_credential(&value).context("Invalid credential")?;
            repo.save_credential(&credential)?;
            println!("Stored credential for {}.", credential.user_id);
            return Ok(());
        }
        _ => {}
    }

    let auth = match (&cli.user, &cli.credentials) {
        (Some(user), _) => {
            let credential = repo
                .credential(user)?
                .ok_or_else(|| school_drive::DriveError::CredentialNotFound(user.clone()))?;
            Authenticator::from_credential(credential)
        }
        (None, Some(path)) => Authenticator::from_file(path)
            .with_context(|| format!("Failed to load credentials from {:?}", path))?,
        (None, None) => bail!("Pass --user or --credentials"),
    };
    let viewer = cli.user.clone().unwrap_or_else(|| "service-account".to_string());

    let mut client = DriveClient::new(auth);
    if let Some(drive_id) = &cli.drive_id {
        client = client.with_shared_drive(drive_id.as_str());
    }
    let mut tracker = match repo.tasks() {
        Ok(tasks) => TaskTracker::with_tasks(tasks),
        Err(e) => {
            warn!(error = %e, "failed to load recorded tasks");
            TaskTracker::new()
        }
    };

    if let Commands::CreateFolders {
        parent,
        students,
        gakunen,
        hr,
    } = &cli.command
    {
        let parent_id = parse_folder_ref(parent)
            .with_context(|| format!("Invalid folder URL or ID: {}", parent))?;
        let hr = Hr::parse(hr).with_context(|| format!("Invalid homeroom: {}", hr))?;
        let content = std::fs::read_to_string(students)
            .with_context(|| format!("Failed to read {:?}", students))?;
        let value: serde_json::Value =
            serde_json::from_str(&content).context("Student list is not JSON")?;
        let Some(items) = value.as_array() else {
            bail!("Student list must be a JSON array");
        };
        let mut selected = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let student =
                parse_student(item).with_context(|| format!("Invalid student at index {}", i))?;
            if student.in_class(*gakunen, hr) {
                selected.push(student);
            }
        }
        if selected.is_empty() {
            println!("No students match.");
            return Ok(());
        }

        println!("Creating {} folder(s) in {}...", selected.len(), parent_id);
        let result = create_student_folders(&client, &parent_id, &selected, &mut tracker).await;
        if let Some(task) = tracker.tasks().last() {
            if let Err(e) = repo.save_task(task) {
                warn!(task_id = %task.id, error = %e, "failed to save task");
            }
        }
        for folder in result.context("Failed to create folders")? {
            println!("{}", folder);
        }
        return Ok(());
    }

    let mut view = FolderView::new(client, TracingNotifier);
    let folder = match &cli.command {
        Commands::List { folder }
        | Commands::Tag { folder, .. }
        | Commands::Rename { folder, .. }
        | Commands::Move { folder, .. }
        | Commands::Delete { folder, .. } => folder,
        Commands::CreateFolders { .. }
        | Commands::Tasks
        | Commands::Stats { .. }
        | Commands::ImportCredential { .. } => unreachable!("handled above"),
    };
    let folder_id =
        parse_folder_ref(folder).with_context(|| format!("Invalid folder URL or ID: {}", folder))?;

    match view
        .load(&folder_id, false)
        .await
        .with_context(|| format!("Failed to list files in folder: {}", folder_id))?
    {
        LoadOutcome::Loaded(_) => {}
        LoadOutcome::Rejected(failure) => {
            bail!("Drive returned an unexpected listing: {}", failure)
        }
    }

    let now = Utc::now();
    for record in view.collection().records() {
        if let Err(e) = repo.record_view(record, &viewer, now) {
            warn!(file_id = %record.id, error = %e, "failed to record view");
        }
    }

    match cli.command {
        Commands::List { .. } => {
            if view.collection().is_empty() {
                println!("No files found.");
            } else {
                println!("  {:<44} {:<16} {:<30} {}", "ID", "MODIFIED", "TYPE", "NAME");
                println!("{}", "-".repeat(100));
                for record in view.collection().records() {
                    println!("{}", record);
                }
            }
            return Ok(());
        }

        Commands::Tag { file, tags, .. } => {
            ensure_present(&view, &file)?;
            view.stage_tags(&file, tags);
        }

        Commands::Rename {
            file,
            nendo,
            gakunen,
            hr,
            hr_no,
            family_name,
            given_name,
            email,
            dry_run,
            ..
        } => {
            ensure_present(&view, &file)?;
            if Hr::parse(&hr) == Some(Hr::All) {
                bail!("A student belongs to one homeroom; ALL is only a filter");
            }
            let student = parse_student(&json!({
                "gakunen": gakunen,
                "hr": hr,
                "hrNo": hr_no,
                "familyName": family_name,
                "givenName": given_name,
                "email": email,
            }))
            .context("Invalid student")?;

            if let Some(name) = view.stage_rename(&file, &student, nendo) {
                println!("Proposed name: {}", name);
            }
            if dry_run {
                return Ok(());
            }
        }

        Commands::Move { files, to, .. } => {
            for file in &files {
                ensure_present(&view, file)?;
            }
            let target =
                parse_folder_ref(&to).with_context(|| format!("Invalid folder URL or ID: {}", to))?;
            view.stage_move(&files, Destination { id: Some(target), name: None });
        }

        Commands::Delete { files, .. } => {
            for file in &files {
                ensure_present(&view, file)?;
            }
            view.dispatch(Command::SetSelectedAll(false));
            for file in &files {
                view.dispatch(Command::UpdateOne {
                    id: file.clone(),
                    patch: MetaPatch::default().selected(true),
                });
            }
            println!("Deleting {} file(s)...", files.len());
            let result = view.delete_selected(&mut tracker).await;
            if let Some(task) = tracker.tasks().last() {
                if let Err(e) = repo.save_task(task) {
                    warn!(task_id = %task.id, error = %e, "failed to save task");
                }
            }
            let deleted = result.context("Failed to delete files")?;
            println!("Deleted {} file(s).", deleted);
            return Ok(());
        }

        Commands::CreateFolders { .. }
        | Commands::Tasks
        | Commands::Stats { .. }
        | Commands::ImportCredential { .. } => unreachable!("handled above"),
    }

    let pending = view.pending_updates().len();
    if pending == 0 {
        println!("Nothing to change.");
        return Ok(());
    }
    println!("Updating {} file(s)...", pending);

    let result = view.commit(&mut tracker).await;

    // Persist the task whatever the outcome
    if let Some(task) = tracker.tasks().last() {
        if let Err(e) = repo.save_task(task) {
            warn!(task_id = %task.id, error = %e, "failed to save task");
        }
    }

    let report = result.context("Failed to update files")?;
    println!("Updated {} file(s).", report.updated);
    if report.rejected > 0 {
        eprintln!("Warning: {} file(s) came back in an unexpected shape", report.rejected);
    }

    Ok(())
}

fn ensure_present<R, N>(view: &FolderView<R, N>, file_id: &str) -> Result<()>
where
    R: school_drive::RemoteStore,
    N: school_drive::Notifier,
{
    if view.collection().get(file_id).is_none() {
        bail!("File {} is not in folder {}", file_id, view.folder_id().unwrap_or("-"));
    }
    Ok(())
}
