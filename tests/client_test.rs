//! Tests for DriveClient with mocked HTTP responses.

use mockito::{Matcher, Server};
use serde_json::json;
use school_drive::client::{DriveClient, FileUpdate, RemoteStore};
use school_drive::error::DriveError;
use school_drive::validation::{parse_drive_file, parse_drive_files};
use school_drive::Authenticator;

fn client(server: &Server) -> DriveClient {
    DriveClient::new(Authenticator::from_token("test-token")).with_base_url(server.url())
}

fn raw_file(id: &str, name: &str, parent: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "mimeType": "application/pdf",
        "iconLink": "https://drive-thirdparty.googleusercontent.com/16/type/application/pdf",
        "webViewLink": format!("https://drive.google.com/file/d/{}/view", id),
        "parents": [parent],
        "createdTime": "2024-04-01T09:00:00.000Z",
        "modifiedTime": "2024-04-03T10:30:00.000Z"
    })
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn test_list_files_returns_raw_array() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "'p1' in parents and trashed = false".into()),
                Matcher::UrlEncoded("supportsAllDrives".into(), "true".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "files": [raw_file("f1", "a.pdf", "p1"), raw_file("f2", "b.pdf", "p1")]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let raw = client(&server).list_files("p1").await.unwrap();
        mock.assert_async().await;

        let records = parse_drive_files(&raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "b.pdf");
    }

    #[tokio::test]
    async fn test_shared_drive_scoping() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("driveId".into(), "drive-1".into()),
                Matcher::UrlEncoded("corpora".into(), "drive".into()),
            ]))
            .with_status(200)
            .with_body(json!({"files": []}).to_string())
            .create_async()
            .await;

        let client = client(&server).with_shared_drive("drive-1");
        assert_eq!(client.drive_id(), Some("drive-1"));
        let raw = client.list_files("p1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(raw, json!([]));
    }

    #[tokio::test]
    async fn test_quote_in_folder_id_is_escaped() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                "'p\\'1' in parents and trashed = false".into(),
            ))
            .with_status(200)
            .with_body(json!({"files": []}).to_string())
            .create_async()
            .await;

        client(&server).list_files("p'1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(
                json!({"error": {"code": 404, "message": "File not found: p9."}}).to_string(),
            )
            .create_async()
            .await;

        let err = client(&server).list_files("p9").await.unwrap_err();
        match err {
            DriveError::ApiError { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("p9"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_text_error_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("backend unavailable")
            .create_async()
            .await;

        let err = client(&server).list_files("p1").await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("503"));
    }
}

mod updates {
    use super::*;

    #[tokio::test]
    async fn test_rename_and_move() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/files/f1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("addParents".into(), "p2".into()),
                Matcher::UrlEncoded("removeParents".into(), "p1".into()),
            ]))
            .match_body(Matcher::Json(json!({
                "name": "2024_2B07_山田花子.pdf",
                "appProperties": {"nendo": "2024"}
            })))
            .with_status(200)
            .with_body(raw_file("f1", "2024_2B07_山田花子.pdf", "p2").to_string())
            .create_async()
            .await;

        let update = FileUpdate {
            name: Some("2024_2B07_山田花子.pdf".to_string()),
            app_properties: Some([("nendo".to_string(), "2024".to_string())].into()),
            add_parents: vec!["p2".to_string()],
            remove_parents: vec!["p1".to_string()],
        };
        let echo = client(&server).update_properties("f1", &update).await.unwrap();
        mock.assert_async().await;

        let record = parse_drive_file(&echo).unwrap();
        assert_eq!(record.parents, vec!["p2".to_string()]);
        assert_eq!(record.name, "2024_2B07_山田花子.pdf");
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_ok() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/files/gone")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        assert!(client(&server).delete_file("gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_folder() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "name": "2B07 山田花子",
                "mimeType": "application/vnd.google-apps.folder",
                "parents": ["p1"]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "id": "new1",
                    "name": "2B07 山田花子",
                    "mimeType": "application/vnd.google-apps.folder",
                    "parents": ["p1"],
                    "createdTime": "2024-04-01T09:00:00Z",
                    "modifiedTime": "2024-04-01T09:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let raw = client(&server).create_folder("2B07 山田花子", "p1").await.unwrap();
        mock.assert_async().await;
        assert!(parse_drive_file(&raw).unwrap().is_folder());
    }
}

mod folders {
    use super::*;
    use school_drive::folders::create_student_folders;
    use school_drive::models::{Hr, Student};
    use school_drive::TaskTracker;

    fn student(hr: Hr, hr_no: u16, family_name: &str) -> Student {
        Student {
            gakunen: 1,
            hr,
            hr_no,
            family_name: family_name.to_string(),
            given_name: "花子".to_string(),
            email: None,
        }
    }

    fn folder(id: &str, name: &str) -> String {
        json!({
            "id": id,
            "name": name,
            "mimeType": "application/vnd.google-apps.folder",
            "parents": ["root1"],
            "createdTime": "2024-04-01T09:00:00Z",
            "modifiedTime": "2024-04-01T09:00:00Z"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_one_folder_per_student() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"name": "1A01 山田花子"})))
            .with_status(200)
            .with_body(folder("d1", "1A01 山田花子"))
            .create_async()
            .await;
        let second = server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"name": "1B02 鈴木花子"})))
            .with_status(200)
            .with_body(folder("d2", "1B02 鈴木花子"))
            .create_async()
            .await;

        let students = vec![student(Hr::A, 1, "山田"), student(Hr::B, 2, "鈴木")];
        let mut tracker = TaskTracker::new();
        let created = create_student_folders(&client(&server), "root1", &students, &mut tracker)
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|f| f.is_folder()));

        let task = &tracker.tasks()[0];
        assert_eq!(task.students.as_ref().map(Vec::len), Some(2));
        assert!(!task.active);
    }

    #[tokio::test]
    async fn test_unexpected_echo_stops_the_batch() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"id": "d1"}).to_string())
            .create_async()
            .await;

        let students = vec![student(Hr::A, 1, "山田"), student(Hr::B, 2, "鈴木")];
        let mut tracker = TaskTracker::new();
        let err = create_student_folders(&client(&server), "root1", &students, &mut tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, DriveError::Validation(_)));
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_all_homeroom_creates_nothing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/files")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let students = vec![student(Hr::A, 1, "山田"), student(Hr::All, 7, "鈴木")];
        let mut tracker = TaskTracker::new();
        let err = create_student_folders(&client(&server), "root1", &students, &mut tracker)
            .await
            .unwrap_err();

        mock.assert_async().await;
        match err {
            DriveError::Validation(failure) => assert!(failure.has_issue_at("[1].hr")),
            other => panic!("unexpected error: {}", other),
        }
        assert!(tracker.tasks().is_empty());
    }
}

mod credentials {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_authenticator_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let creds_json = json!({
            "client_email": "test@project.iam.gserviceaccount.com",
            "private_key": "key"
        });

        temp_file.write_all(creds_json.to_string().as_bytes()).unwrap();

        assert!(Authenticator::from_file(temp_file.path()).is_ok());
    }

    #[test]
    fn test_authenticator_from_invalid_file() {
        let auth = Authenticator::from_file("/nonexistent/path/credentials.json");
        assert!(matches!(auth, Err(DriveError::CredentialsFileError(_))));
    }

    #[test]
    fn test_authenticator_from_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();

        let auth = Authenticator::from_file(temp_file.path());
        assert!(matches!(auth, Err(DriveError::JsonError(_))));
    }
}
