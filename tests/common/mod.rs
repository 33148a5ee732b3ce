//! Shared mock API for integration tests
//!
//! Mounts the profile API endpoints on a wiremock server. Every
//! authenticated route only matches the bearer token of the identity it was
//! mounted for, so a request made with the wrong session falls through to
//! wiremock's 404.

#![allow(dead_code)]

use serde_json::{json, Value};
use upload_verifier::config::{ApiConfig, Config};
use upload_verifier::session::Identity;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Base URL of the mock API, mounted under `/api`
pub fn base_url(server: &MockServer) -> String {
    format!("{}/api", server.uri())
}

pub fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: base_url(server),
        probe_timeout_seconds: 2,
    }
}

pub fn identity(email: &str, password: &str, name: &str) -> Identity {
    Identity::new(email, password, name)
}

/// Config for `identities` with the photo probe disabled
pub fn config(server: &MockServer, identities: Vec<Identity>) -> Config {
    let mut config = Config::new(base_url(server), identities);
    config.scenario.photo.probe_accessibility = false;
    config
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Accept `email`/`password` with `token`
pub async fn mount_login(server: &MockServer, email: &str, password: &str, token: &str, user_id: i64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "email": email, "password": password })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": token,
            "user": { "id": user_id, "email": email }
        })))
        .mount(server)
        .await;
}

/// Reject `email` with HTTP 401
pub async fn mount_login_rejected(server: &MockServer, email: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_string_contains(email))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid credentials" })),
        )
        .mount(server)
        .await;
}

/// Accept uploads of `kind` for `token`, answering with a snake_case row
/// that reports `size` bytes
pub async fn mount_document_upload(
    server: &MockServer,
    token: &str,
    kind: &str,
    id: i64,
    size: u64,
) {
    Mock::given(method("POST"))
        .and(path("/api/profile/documents"))
        .and(header("Authorization", bearer(token).as_str()))
        .and(body_string_contains(format!("\r\n\r\n{kind}\r\n").as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "message": "Document uploaded successfully",
            "document": {
                "id": id,
                "document_type": kind,
                "document_name": format!("test-{kind}.pdf"),
                "file_url": format!("/uploads/documents/{id}.pdf"),
                "file_size": size,
                "mime_type": "application/pdf",
                "is_primary": true
            }
        })))
        .mount(server)
        .await;
}

/// Accept every document upload for `token`
pub async fn mount_any_document_upload(server: &MockServer, token: &str, id: i64) {
    Mock::given(method("POST"))
        .and(path("/api/profile/documents"))
        .and(header("Authorization", bearer(token).as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "document": { "id": id }
        })))
        .mount(server)
        .await;
}

/// A camelCase listing record
pub fn listed(id: i64, kind: &str) -> Value {
    json!({
        "id": id,
        "documentType": kind,
        "documentName": format!("test-{kind}.pdf"),
        "fileUrl": format!("/uploads/documents/{id}.pdf"),
        "fileSize": 1024,
        "mimeType": "application/pdf",
        "uploadedAt": "2026-01-01T00:00:00Z",
        "isPrimary": true
    })
}

/// Listing of `records` for `token`
pub async fn mount_listing(server: &MockServer, token: &str, records: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/profile/documents"))
        .and(header("Authorization", bearer(token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": records })))
        .mount(server)
        .await;
}

/// Listing with one record per kind, ids starting at `first_id`
pub async fn mount_full_listing(server: &MockServer, token: &str, first_id: i64) {
    let records = ["cv", "cover_letter", "id_document", "certificate", "reference", "portfolio"]
        .iter()
        .enumerate()
        .map(|(i, kind)| listed(first_id + i as i64, kind))
        .collect();
    mount_listing(server, token, records).await;
}

/// Photo upload answering `photo_url` for `token`
pub async fn mount_photo_upload(server: &MockServer, token: &str, photo_url: &str) {
    Mock::given(method("POST"))
        .and(path("/api/profile/photo"))
        .and(header("Authorization", bearer(token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Profile photo uploaded successfully",
            "photoUrl": photo_url
        })))
        .mount(server)
        .await;
}

/// Profile of `token` showing `photo_url`
pub async fn mount_profile(server: &MockServer, token: &str, photo_url: Option<&str>) {
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("Authorization", bearer(token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "profile": { "id": 1, "profilePhotoUrl": photo_url }
        })))
        .mount(server)
        .await;
}

/// A fully working identity: login, uploads, listing, photo and profile
pub async fn mount_healthy_identity(
    server: &MockServer,
    email: &str,
    password: &str,
    token: &str,
    first_id: i64,
) -> String {
    let photo_url = format!("/uploads/photos/{token}.png");
    mount_login(server, email, password, token, first_id).await;
    mount_any_document_upload(server, token, first_id).await;
    mount_full_listing(server, token, first_id).await;
    mount_photo_upload(server, token, &photo_url).await;
    mount_profile(server, token, Some(&photo_url)).await;
    photo_url
}
