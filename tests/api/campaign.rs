use serde_json::{Value, json};
use uuid::Uuid;

use crate::helpers::{access_token_for, contacts, spawn_app};

#[tokio::test]
async fn campaign_status_starts_idle() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let status = app.get_campaign_status().await;

    // Assert
    assert_eq!(status["isRunning"], false);
    assert_eq!(status["remaining"], 0);
    assert_eq!(status["status"], "idle");
    assert_eq!(status["completed"], false);
    assert_eq!(status["errors"], json!([]));
}

#[tokio::test]
async fn send_emails_returns_400_when_no_account_is_selected() {
    // Arrange
    let app = spawn_app().await;
    app.post_contacts(&json!({ "contacts": contacts(&["a@example.com"]) }))
        .await;

    // Act
    let response = app
        .post_send_emails(&json!({ "subject": "Hello", "selectedAccounts": [] }))
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Please select at least one email account");
    assert_eq!(app.get_campaign_status().await["status"], "idle");
}

#[tokio::test]
async fn send_emails_returns_400_for_invalid_preconditions() {
    // Arrange
    let app = spawn_app().await;
    let account = app.connect_gmail_account("sender@gmail.com").await;
    let unknown = Uuid::new_v4();
    let test_cases = vec![
        (
            json!({ "subject": "Hello", "selectedAccounts": [unknown.to_string()] }),
            format!("Account ID {unknown} not found"),
        ),
        (
            json!({ "subject": "   ", "selectedAccounts": [account.to_string()] }),
            "Email subject is required".to_string(),
        ),
        (
            json!({ "subject": "Hello", "selectedAccounts": [account.to_string()] }),
            "No valid contacts found".to_string(),
        ),
        (
            json!({
                "subject": "Hello",
                "selectedAccounts": [account.to_string()],
                "messagesPerBlock": 0,
                "contacts": contacts(&["a@example.com"]),
            }),
            "messagesPerBlock must be at least 1".to_string(),
        ),
        (
            json!({
                "subject": "Hello",
                "selectedAccounts": [account.to_string()],
                "contacts": [{ "email": "not-an-email" }],
            }),
            "invalid contact, not-an-email is not a valid recipient email.".to_string(),
        ),
    ];

    for (body, expected_error) in test_cases {
        // Act
        let response = app.post_send_emails(&body).await;

        // Assert
        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload was {}.",
            body
        );
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], expected_error.as_str());
    }
    assert_eq!(app.get_campaign_status().await["status"], "idle");
}

#[tokio::test]
async fn send_emails_rejects_accounts_that_are_not_connected() {
    // Arrange
    let app = spawn_app().await;
    let response = app
        .post_smtp_account(&json!({
            "name": "Sales",
            "email": "sales@example.com",
            "host": "127.0.0.1",
            "port": 2525,
            "username": "sales@example.com",
            "password": "secret",
        }))
        .await;
    let added: Value = response.json().await.unwrap();

    // Act
    let response = app
        .post_send_emails(&json!({
            "subject": "Hello",
            "selectedAccounts": [added["id"]],
            "contacts": contacts(&["a@example.com"]),
        }))
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Account sales@example.com is not connected");
}

#[tokio::test]
async fn a_campaign_alternates_between_accounts_and_completes() {
    // Arrange
    let app = spawn_app().await;
    let first = app.connect_gmail_account("first@gmail.com").await;
    let second = app.connect_gmail_account("second@gmail.com").await;
    app.gmail_accepts_sends_from("first@gmail.com").await;
    app.gmail_accepts_sends_from("second@gmail.com").await;
    app.post_contacts(&json!({
        "contacts": contacts(&["r1@example.com", "r2@example.com", "r3@example.com", "r4@example.com"]),
    }))
    .await;

    // Act
    let response = app
        .post_send_emails(&json!({
            "subject": "Quarterly news",
            "pauseBetweenMessages": 0,
            "pauseBetweenBlocks": 0,
            "messagesPerBlock": 2,
            "maxConnections": 1,
            "retries": 0,
            "selectedAccounts": [first.to_string(), second.to_string()],
        }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let status = app.wait_for_campaign().await;

    // Assert
    assert_eq!(status["status"], "completed");
    assert_eq!(status["completed"], true);
    assert_eq!(status["remaining"], 0);
    assert_eq!(status["sent"], 4);
    assert_eq!(status["total"], 4);
    assert_eq!(status["errors"], json!([]));

    let senders: Vec<String> = app
        .sent_gmail_messages()
        .await
        .into_iter()
        .map(|(token, _)| token)
        .collect();
    let first_token = access_token_for("first@gmail.com");
    let second_token = access_token_for("second@gmail.com");
    assert_eq!(
        senders,
        vec![first_token.clone(), second_token.clone(), first_token, second_token]
    );
}

#[tokio::test]
async fn failed_recipients_are_reported_after_their_retries() {
    // Arrange
    let app = spawn_app().await;
    let account = app.connect_gmail_account("broken@gmail.com").await;
    app.gmail_rejects_sends_from("broken@gmail.com").await;

    // Act
    let response = app
        .post_send_emails(&json!({
            "subject": "Hello",
            "retries": 2,
            "maxConnections": 1,
            "selectedAccounts": [account.to_string()],
            "contacts": contacts(&["a@example.com", "b@example.com"]),
        }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let status = app.wait_for_campaign().await;

    // Assert
    assert_eq!(status["completed"], true);
    assert_eq!(status["failed"], 2);
    assert_eq!(status["remaining"], 0);
    assert_eq!(
        status["errors"],
        json!([
            "a@example.com: Gmail API answered 500: backend error",
            "b@example.com: Gmail API answered 500: backend error",
        ])
    );
    assert_eq!(app.sent_gmail_messages().await.len(), 6);
}

#[tokio::test]
async fn each_contact_receives_the_template_for_its_language() {
    // Arrange
    let app = spawn_app().await;
    let account = app.connect_gmail_account("sender@gmail.com").await;
    app.gmail_accepts_sends_from("sender@gmail.com").await;
    app.post_templates(&json!({
        "templates": [
            { "id": "EN", "body": "Hello [NAME]", "isDefault": true },
            { "id": "FR", "subject": "Nouvelles", "body": "Bonjour [NAME]", "isDefault": false },
        ],
    }))
    .await;

    // Act
    app.post_send_emails(&json!({
        "subject": "News",
        "maxConnections": 1,
        "selectedAccounts": [account.to_string()],
        "contacts": [
            { "email": "marie@example.com", "name": "Marie", "language": "fr" },
            { "email": "john@example.com", "name": "John" },
        ],
    }))
    .await;
    app.wait_for_campaign().await;

    // Assert
    let messages: Vec<String> = app
        .sent_gmail_messages()
        .await
        .into_iter()
        .map(|(_, message)| message)
        .collect();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("Subject: Nouvelles"));
    assert!(messages[0].contains("Bonjour Marie"));
    assert!(messages[1].contains("Subject: News"));
    assert!(messages[1].contains("Hello John"));
}

#[tokio::test]
async fn a_running_campaign_can_be_stopped_but_not_reset_or_restarted() {
    // Arrange
    let app = spawn_app().await;
    let account = app.connect_gmail_account("sender@gmail.com").await;
    app.gmail_accepts_sends_from("sender@gmail.com").await;
    let body = json!({
        "subject": "Hello",
        "pauseBetweenMessages": 30,
        "selectedAccounts": [account.to_string()],
        "contacts": contacts(&["a@example.com", "b@example.com", "c@example.com"]),
    });
    assert_eq!(app.post_send_emails(&body).await.status().as_u16(), 200);

    // Act
    let restart = app.post_send_emails(&body).await;
    let reset = app.post_reset_campaign().await;
    let stop = app.post_stop_campaign().await;
    let status = app.wait_for_campaign().await;

    // Assert
    assert_eq!(restart.status().as_u16(), 409);
    assert_eq!(reset.status().as_u16(), 409);
    assert_eq!(stop.status().as_u16(), 200);
    assert_eq!(status["status"], "failed");
    assert_eq!(status["completed"], false);
    assert!(status["remaining"].as_u64().unwrap() >= 2);
    assert!(
        status["errors"]
            .as_array()
            .unwrap()
            .last()
            .and_then(Value::as_str)
            .unwrap()
            .starts_with("Campaign stopped")
    );
}

#[tokio::test]
async fn reset_after_a_campaign_returns_to_idle() {
    // Arrange
    let app = spawn_app().await;
    let account = app.connect_gmail_account("sender@gmail.com").await;
    app.gmail_accepts_sends_from("sender@gmail.com").await;
    app.post_send_emails(&json!({
        "subject": "Hello",
        "selectedAccounts": [account.to_string()],
        "contacts": contacts(&["a@example.com"]),
    }))
    .await;
    app.wait_for_campaign().await;

    // Act
    let first = app.post_reset_campaign().await;
    let second = app.post_reset_campaign().await;

    // Assert
    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 200);
    let status = app.get_campaign_status().await;
    assert_eq!(status["isRunning"], false);
    assert_eq!(status["remaining"], 0);
    assert_eq!(status["status"], "idle");
    assert_eq!(status["completed"], false);
    assert_eq!(status["errors"], json!([]));
}

#[tokio::test]
async fn stop_campaign_returns_409_when_nothing_is_running() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.post_stop_campaign().await;

    // Assert
    assert_eq!(response.status().as_u16(), 409);
}
