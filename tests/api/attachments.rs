use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

use crate::helpers::{contacts, spawn_app};

#[tokio::test]
async fn uploaded_attachments_are_listed_with_their_size() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .post_attachment("price-list.pdf", b"%PDF-1.4 fake", "application/pdf")
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Attachment uploaded successfully!");
    assert_eq!(body["filename"], "price-list.pdf");
    assert_eq!(
        app.get_attachments().await,
        json!({ "attachments": [{ "filename": "price-list.pdf", "size": 13 }] })
    );
}

#[tokio::test]
async fn uploading_the_same_name_twice_keeps_one_file() {
    // Arrange
    let app = spawn_app().await;
    app.post_attachment("notes.txt", b"first", "text/plain").await;

    // Act
    app.post_attachment("notes.txt", b"second draft", "text/plain")
        .await;

    // Assert
    assert_eq!(
        app.get_attachments().await,
        json!({ "attachments": [{ "filename": "notes.txt", "size": 12 }] })
    );
}

#[tokio::test]
async fn upload_attachment_returns_400_for_a_malformed_upload() {
    // Arrange
    let app = spawn_app().await;
    let test_cases = vec![
        (Form::new().text("other", "value"), "No file part"),
        (
            Form::new().part("file", Part::bytes(b"data".to_vec()).file_name("")),
            "No selected file",
        ),
        (
            Form::new().part("file", Part::bytes(b"data".to_vec())),
            "No selected file",
        ),
    ];

    for (form, expected_error) in test_cases {
        // Act
        let response = app.post_form("/upload-attachment", form).await;

        // Assert
        assert_eq!(
            response.status().as_u16(),
            400,
            "The API did not fail with 400 Bad Request when {}.",
            expected_error
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], expected_error);
    }
    assert_eq!(app.get_attachments().await, json!({ "attachments": [] }));
}

#[tokio::test]
async fn a_deleted_attachment_is_gone() {
    // Arrange
    let app = spawn_app().await;
    app.post_attachment("logo.png", &[0x89, 0x50, 0x4e, 0x47], "image/png")
        .await;

    // Act
    let response = app
        .post_delete_attachment(&json!({ "filename": "logo.png" }))
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Attachment logo.png deleted successfully");
    assert_eq!(app.get_attachments().await, json!({ "attachments": [] }));

    let again = app
        .post_delete_attachment(&json!({ "filename": "logo.png" }))
        .await;
    assert_eq!(again.status().as_u16(), 404);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["error"], "File not found");
}

#[tokio::test]
async fn delete_attachment_returns_400_without_a_filename() {
    // Arrange
    let app = spawn_app().await;

    for body in [json!({}), json!({ "filename": "  " })] {
        // Act
        let response = app.post_delete_attachment(&body).await;

        // Assert
        assert_eq!(response.status().as_u16(), 400);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], "No filename provided");
    }
}

#[tokio::test]
async fn campaign_messages_carry_the_uploaded_attachments() {
    // Arrange
    let app = spawn_app().await;
    let account = app.connect_gmail_account("sender@gmail.com").await;
    app.gmail_accepts_sends_from("sender@gmail.com").await;
    app.post_attachment("report.txt", b"quarterly figures", "text/plain")
        .await;

    // Act
    let response = app
        .post_send_emails(&json!({
            "subject": "Quarterly news",
            "retries": 0,
            "selectedAccounts": [account.to_string()],
            "contacts": contacts(&["r1@example.com", "r2@example.com"]),
        }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let status = app.wait_for_campaign().await;

    // Assert
    assert_eq!(status["sent"], 2);
    let messages = app.sent_gmail_messages().await;
    assert_eq!(messages.len(), 2);
    for (_, message) in messages {
        assert!(message.contains("multipart/mixed"), "{message}");
        assert!(message.contains("filename=\"report.txt\""), "{message}");
    }
}
