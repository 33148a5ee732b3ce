//! Session Manager Integration Tests
//!
//! Login against a mock API.

mod common;

use common::{api_config, identity, mount_login, mount_login_rejected};
use serde_json::json;
use upload_verifier::api::ApiClient;
use upload_verifier::session::{AuthError, SessionManager};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager(server: &MockServer) -> SessionManager {
    SessionManager::new(ApiClient::new(&api_config(server)).unwrap())
}

#[tokio::test]
async fn test_authenticate_returns_token_and_user_id() {
    let server = MockServer::start().await;
    mount_login(&server, "demo@writenow.com", "Demo123!", "tok-demo", 42).await;

    let session = manager(&server)
        .authenticate(&identity("demo@writenow.com", "Demo123!", "Demo User"))
        .await
        .unwrap();

    assert_eq!(session.token(), "tok-demo");
    assert_eq!(session.user_id(), Some("42"));
    assert_eq!(session.identity().email, "demo@writenow.com");
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = MockServer::start().await;
    mount_login_rejected(&server, "demo@writenow.com").await;

    let result = manager(&server)
        .authenticate(&identity("demo@writenow.com", "wrong", "Demo User"))
        .await;

    match result {
        Err(AuthError::Rejected { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid credentials"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_200_success_status_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": "tok" })))
        .mount(&server)
        .await;

    let result = manager(&server)
        .authenticate(&identity("a@example.com", "pw", "A"))
        .await;
    assert!(matches!(result, Err(AuthError::Rejected { status: 201, .. })));
}

#[tokio::test]
async fn test_missing_token_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": { "id": 1 } })))
        .mount(&server)
        .await;

    let result = manager(&server)
        .authenticate(&identity("a@example.com", "pw", "A"))
        .await;
    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let result = manager(&server)
        .authenticate(&identity("a@example.com", "pw", "A"))
        .await;
    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_string_user_id_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok",
            "user": { "id": "a1b2" }
        })))
        .mount(&server)
        .await;

    let session = manager(&server)
        .authenticate(&identity("a@example.com", "pw", "A"))
        .await
        .unwrap();
    assert_eq!(session.user_id(), Some("a1b2"));
}

#[tokio::test]
async fn test_unreachable_api_is_transport_error() {
    let server = MockServer::builder().start().await;
    let config = api_config(&server);
    drop(server);

    let result = SessionManager::new(ApiClient::new(&config).unwrap())
        .authenticate(&identity("a@example.com", "pw", "A"))
        .await;
    assert!(matches!(result, Err(AuthError::Transport(_))));
}
