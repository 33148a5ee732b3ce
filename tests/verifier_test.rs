//! State Verifier Integration Tests
//!
//! Reads listings, profiles and photo URLs back from a mock API.

mod common;

use common::{api_config, identity, listed, mount_listing, mount_profile};
use serde_json::json;
use upload_verifier::api::ApiClient;
use upload_verifier::fabricate::ArtifactKind;
use upload_verifier::session::Session;
use upload_verifier::verify::{self, ProbeOutcome, StateVerifier, VerifyError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn verifier(server: &MockServer) -> StateVerifier {
    StateVerifier::new(ApiClient::new(&api_config(server)).unwrap())
}

fn session(token: &str) -> Session {
    Session::new(identity("a@example.com", "pw", "Alice"), token, None)
}

#[tokio::test]
async fn test_list_records_and_check_presence() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "tok-a",
        vec![listed(1, "cv"), listed(2, "cv"), listed(3, "portfolio")],
    )
    .await;

    let records = verifier(&server).list_records(&session("tok-a")).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].file_size, Some(1024));

    let index = verify::group_by_kind(&records);
    assert_eq!(verify::check_presence("a@example.com", ArtifactKind::Cv, &index), Ok(2));
    assert!(verify::check_presence("a@example.com", ArtifactKind::Reference, &index).is_err());
}

#[tokio::test]
async fn test_list_records_is_scoped_to_token() {
    let server = MockServer::start().await;
    mount_listing(&server, "tok-a", vec![listed(1, "cv")]).await;

    let result = verifier(&server).list_records(&session("tok-b")).await;
    assert!(matches!(result, Err(VerifyError::Rejected { status: 404, .. })));
}

#[tokio::test]
async fn test_list_records_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": "none" })))
        .mount(&server)
        .await;

    let result = verifier(&server).list_records(&session("tok-a")).await;
    assert!(matches!(result, Err(VerifyError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_profile_photo_round_trip() {
    let server = MockServer::start().await;
    mount_profile(&server, "tok-a", Some("/uploads/photos/a.png")).await;

    let observed = verifier(&server)
        .get_profile_photo(&session("tok-a"))
        .await
        .unwrap();
    assert_eq!(observed.as_deref(), Some("/uploads/photos/a.png"));
    assert!(verify::check_photo_round_trip(
        "a@example.com",
        "/uploads/photos/a.png",
        observed.as_deref()
    )
    .is_ok());
}

#[tokio::test]
async fn test_profile_without_photo() {
    let server = MockServer::start().await;
    mount_profile(&server, "tok-a", None).await;

    let observed = verifier(&server)
        .get_profile_photo(&session("tok-a"))
        .await
        .unwrap();
    assert_eq!(observed, None);
}

#[tokio::test]
async fn test_probe_accessible_photo() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/uploads/photos/a.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .mount(&server)
        .await;

    let outcome = verifier(&server).probe("/uploads/photos/a.png").await;
    assert_eq!(
        outcome,
        ProbeOutcome::Accessible {
            status: 200,
            content_type: Some("image/png".into())
        }
    );
}

#[tokio::test]
async fn test_probe_missing_photo_is_unexpected() {
    let server = MockServer::start().await;

    let url = format!("{}/uploads/photos/missing.png", server.uri());
    let outcome = verifier(&server).probe(&url).await;
    assert_eq!(outcome, ProbeOutcome::Unexpected { status: 404 });
    assert!(!outcome.is_accessible());
}

#[tokio::test]
async fn test_probe_unreachable_host() {
    let server = MockServer::builder().start().await;
    let verifier = verifier(&server);
    let url = format!("{}/uploads/photos/a.png", server.uri());
    drop(server);

    let outcome = verifier.probe(&url).await;
    assert!(matches!(outcome, ProbeOutcome::Unreachable(_)));
}
