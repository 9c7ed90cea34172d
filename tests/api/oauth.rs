use reqwest::Url;
use serde_json::{Value, json};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{method, path},
};

use crate::helpers::spawn_app;

#[tokio::test]
async fn the_authorization_url_asks_for_offline_access() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app.get_oauth_url().await;

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let url = Url::parse(body["url"].as_str().unwrap()).unwrap();
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let value_of = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(value_of("response_type"), "code");
    assert_eq!(value_of("access_type"), "offline");
    assert_eq!(value_of("redirect_uri"), "http://localhost:5000/callback");
    assert!(value_of("scope").contains("https://www.googleapis.com/auth/gmail.send"));
    assert_eq!(value_of("state").len(), 32);
}

#[tokio::test]
async fn a_successful_callback_registers_a_connected_gmail_account() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let id = app.connect_gmail_account("owner@gmail.com").await;

    // Assert
    let status = app.get_gmail_status("owner@gmail.com").await;
    assert_eq!(
        status,
        json!({ "connected": true, "email": "owner@gmail.com", "accountId": id.to_string() })
    );
    let accounts = app.get_accounts().await;
    let account = &accounts["accounts"][0];
    assert_eq!(account["type"], "gmail");
    assert_eq!(account["name"], "owner");
    assert_eq!(account["isConnected"], true);
}

#[tokio::test]
async fn reconnecting_replaces_the_previous_account() {
    // Arrange
    let app = spawn_app().await;
    let first = app.connect_gmail_account("owner@gmail.com").await;

    // Act
    let second = app.connect_gmail_account("owner@gmail.com").await;

    // Assert
    assert_ne!(first, second);
    assert_eq!(app.get_accounts().await["accounts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn a_callback_with_an_unknown_state_shows_an_error_page() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .get_callback(&[("code", "authorization-code"), ("state", "forged")])
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let page = response.text().await.unwrap();
    assert!(page.contains("No state found for this request"));
    assert_eq!(app.get_accounts().await["accounts"], json!([]));
}

#[tokio::test]
async fn a_failing_token_exchange_shows_an_error_page() {
    // Arrange
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&app.gmail_server)
        .await;
    let state = app.oauth_state().await;

    // Act
    let response = app
        .get_callback(&[("code", "authorization-code"), ("state", &state)])
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    assert!(response.text().await.unwrap().contains("Error fetching token"));
}

#[tokio::test]
async fn a_state_cannot_be_replayed() {
    // Arrange
    let app = spawn_app().await;
    app.connect_gmail_account("owner@gmail.com").await;
    let state = app.oauth_state().await;
    app.get_callback(&[("error", "access_denied"), ("state", &state)])
        .await;

    // Act
    let response = app
        .get_callback(&[("code", "authorization-code"), ("state", &state)])
        .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn gmail_status_is_false_for_unknown_addresses() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let status = app.get_gmail_status("nobody@gmail.com").await;

    // Assert
    assert_eq!(status, json!({ "connected": false }));
}

#[tokio::test]
async fn revoking_removes_the_gmail_account() {
    // Arrange
    let app = spawn_app().await;
    let id = app.connect_gmail_account("owner@gmail.com").await;
    let id = id.to_string();

    // Act
    let first = app.post_revoke_oauth(&[("accountId", id.as_str())]).await;
    let second = app.post_revoke_oauth(&[("accountId", id.as_str())]).await;

    // Assert
    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 404);
    assert_eq!(
        app.get_gmail_status("owner@gmail.com").await,
        json!({ "connected": false })
    );
}
