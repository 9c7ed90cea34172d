use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{method, path},
};

use crate::helpers::spawn_app;

fn smtp_account() -> Value {
    json!({
        "name": "Sales",
        "email": "sales@example.com",
        "host": "127.0.0.1",
        "port": 1,
        "username": "sales@example.com",
        "password": "abcd efgh ijkl mnop",
        "use_ssl": false,
    })
}

#[tokio::test]
async fn an_added_smtp_account_is_listed_as_not_connected() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.post_smtp_account(&smtp_account()).await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let added: Value = response.json().await.unwrap();
    assert_eq!(added["message"], "SMTP account added successfully");

    let accounts = app.get_accounts().await;
    let listed = &accounts["accounts"][0];
    assert_eq!(listed["id"], added["id"]);
    assert_eq!(listed["type"], "smtp");
    assert_eq!(listed["email"], "sales@example.com");
    assert_eq!(listed["host"], "127.0.0.1");
    assert_eq!(listed["isConnected"], false);
    assert!(listed.get("password").is_none());
}

#[tokio::test]
async fn add_smtp_account_returns_400_when_fields_are_missing() {
    // Arrange
    let app = spawn_app().await;
    let mut test_cases = Vec::new();
    for field in ["name", "email", "host", "port", "username", "password"] {
        let mut body = smtp_account();
        body.as_object_mut().unwrap().remove(field);
        test_cases.push((body, field));
    }

    for (body, missing) in test_cases {
        // Act
        let response = app.post_smtp_account(&body).await;

        // Assert
        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when {} was missing.",
            missing
        );
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], "All fields are required");
    }
    assert_eq!(app.get_accounts().await["accounts"], json!([]));
}

#[tokio::test]
async fn deleting_an_account_removes_it_once() {
    // Arrange
    let app = spawn_app().await;
    let added: Value = app.post_smtp_account(&smtp_account()).await.json().await.unwrap();
    let id = added["id"].as_str().unwrap();

    // Act
    let first = app.delete_account(id).await;
    let second = app.delete_account(id).await;

    // Assert
    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 404);
    assert_eq!(app.get_accounts().await["accounts"], json!([]));
}

#[tokio::test]
async fn testing_an_unreachable_smtp_server_reports_an_smtp_error() {
    // Arrange
    let app = spawn_app().await;
    let added: Value = app.post_smtp_account(&smtp_account()).await.json().await.unwrap();

    // Act
    let response = app.post_smtp_test(&json!({ "accountId": added["id"] })).await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let error: Value = response.json().await.unwrap();
    assert!(error["error"].as_str().unwrap().starts_with("SMTP Error: "));
    assert_eq!(app.get_accounts().await["accounts"][0]["isConnected"], false);
}

#[tokio::test]
async fn smtp_test_requires_a_known_account() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let missing = app.post_smtp_test(&json!({})).await;
    let unknown = app
        .post_smtp_test(&json!({ "accountId": Uuid::new_v4().to_string() }))
        .await;

    // Assert
    assert_eq!(missing.status().as_u16(), 400);
    assert_eq!(unknown.status().as_u16(), 404);
}

#[tokio::test]
async fn testing_a_gmail_account_can_send_a_test_message() {
    // Arrange
    let app = spawn_app().await;
    let id = app.connect_gmail_account("sender@gmail.com").await;
    app.gmail_accepts_sends_from("sender@gmail.com").await;

    // Act
    let response = app
        .post_smtp_test(&json!({ "accountId": id.to_string(), "testEmail": "me@example.com" }))
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Gmail account connection successful");
    let messages = app.sent_gmail_messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("Subject: Test Email from Email Automation System"));
}

#[tokio::test]
async fn a_failed_gmail_probe_marks_the_account_disconnected() {
    // Arrange
    let app = spawn_app().await;
    let id = app.connect_gmail_account("sender@gmail.com").await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .with_priority(1)
        .mount(&app.gmail_server)
        .await;

    // Act
    let response = app.post_smtp_test(&json!({ "accountId": id.to_string() })).await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let error: Value = response.json().await.unwrap();
    assert_eq!(
        error["error"],
        "Gmail API Error: Gmail API answered 401: invalid credentials"
    );
    assert_eq!(app.get_accounts().await["accounts"][0]["isConnected"], false);
}

#[tokio::test]
async fn test_email_validates_its_input() {
    // Arrange
    let app = spawn_app().await;
    let test_cases = vec![
        (
            json!({ "accountId": Uuid::new_v4().to_string() }),
            "Test email address is required",
        ),
        (
            json!({ "accountId": Uuid::new_v4().to_string(), "test_email": "me@example.com" }),
            "Valid account ID is required",
        ),
    ];

    for (body, expected_error) in test_cases {
        // Act
        let response = app.post_test_email(&body).await;

        // Assert
        assert_eq!(response.status().as_u16(), 400);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], expected_error);
    }
}

#[tokio::test]
async fn test_email_sends_through_the_account() {
    // Arrange
    let app = spawn_app().await;
    let id = app.connect_gmail_account("sender@gmail.com").await;
    app.gmail_accepts_sends_from("sender@gmail.com").await;

    // Act
    let response = app
        .post_test_email(&json!({ "accountId": id.to_string(), "test_email": "me@example.com" }))
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Test email sent successfully via Gmail API");
    let messages = app.sent_gmail_messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("verify your Gmail account connection"));
}
