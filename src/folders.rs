//! Per-student folder creation.

use tracing::info;

use crate::client::DriveClient;
use crate::error::{DriveError, Result};
use crate::models::{DriveFileRecord, Hr, Student, Task, TaskType};
use crate::tasks::{next_task_id, TaskTracker};
use crate::validation::{parse_drive_file, Issue, ValidationFailure};

/// Folder name for a student, e.g. `2B07 山田花子`.
pub fn student_folder_name(student: &Student) -> String {
    format!("{} {}", student.class_code(), student.full_name())
}

/// Create one folder per student under `parent_id`, tracked as a create task.
///
/// Students filed under the `ALL` homeroom are refused before anything is
/// created. Stops at the first failure; folders created before it are kept
/// on Drive.
pub async fn create_student_folders(
    client: &DriveClient,
    parent_id: &str,
    students: &[Student],
    tracker: &mut TaskTracker,
) -> Result<Vec<DriveFileRecord>> {
    check_homerooms(students)?;

    let task_id = next_task_id(TaskType::Create);
    let task = Task::new(task_id.clone(), TaskType::Create).with_students(students.to_vec());
    tracker.start_task(task);

    let mut created = Vec::with_capacity(students.len());
    let mut outcome = Ok(());
    for student in students {
        match create_one(client, parent_id, student).await {
            Ok(folder) => created.push(folder),
            Err(err) => {
                outcome = Err(err);
                break;
            }
        }
    }

    tracker.complete_task(&task_id);
    outcome?;
    info!(parent_id, count = created.len(), "student folders created");
    Ok(created)
}

fn check_homerooms(students: &[Student]) -> Result<()> {
    let issues: Vec<Issue> = students
        .iter()
        .enumerate()
        .filter(|(_, s)| s.hr == Hr::All)
        .map(|(i, _)| Issue {
            path: format!("[{}].hr", i),
            message: "ALL is a filter, not a homeroom".to_string(),
        })
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(DriveError::Validation(ValidationFailure { issues }))
    }
}

async fn create_one(
    client: &DriveClient,
    parent_id: &str,
    student: &Student,
) -> Result<DriveFileRecord> {
    let raw = client
        .create_folder(&student_folder_name(student), parent_id)
        .await?;
    Ok(parse_drive_file(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Hr;

    #[test]
    fn test_folder_name() {
        let student = Student {
            gakunen: 3,
            hr: Hr::F,
            hr_no: 12,
            family_name: "佐藤".to_string(),
            given_name: "一郎".to_string(),
            email: None,
        };
        assert_eq!(student_folder_name(&student), "3F12 佐藤一郎");
    }

    #[test]
    fn test_all_is_not_a_homeroom() {
        let student = |hr| Student {
            gakunen: 2,
            hr,
            hr_no: 7,
            family_name: "山田".to_string(),
            given_name: "花子".to_string(),
            email: None,
        };
        assert!(check_homerooms(&[student(Hr::B)]).is_ok());

        match check_homerooms(&[student(Hr::B), student(Hr::All)]) {
            Err(DriveError::Validation(failure)) => {
                assert!(failure.has_issue_at("[1].hr"));
                assert_eq!(failure.issues.len(), 1);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
