//! Upload driver
//!
//! Submits staged artifacts as multipart forms on behalf of a session and
//! reports what the server stored. Every failure is returned to the caller;
//! the scenario runner records it on the case and moves on.

use crate::api::{paths, ApiClient, ApiError};
use crate::config::DocumentSpec;
use crate::fabricate::{ArtifactKind, StagedArtifact};
use crate::metrics;
use crate::session::Session;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub mod record;

pub use record::{StoredRecord, StoredRecordRef};

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Upload request failed: {0}")]
    Transport(#[from] ApiError),

    #[error("Failed to read staged artifact: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Malformed upload response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Transport(ApiError::Transport(e))
    }
}

/// A fabricated payload plus its upload metadata
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub staged: StagedArtifact,
    pub is_primary: bool,
    pub description: String,
}

impl Artifact {
    /// Document artifact described by `spec`
    pub fn document(spec: &DocumentSpec, staged: StagedArtifact) -> Self {
        Self {
            kind: spec.kind,
            staged,
            is_primary: spec.is_primary,
            description: spec.description(),
        }
    }

    /// Profile photo artifact
    pub fn photo(staged: StagedArtifact) -> Self {
        Self {
            kind: ArtifactKind::ProfilePhoto,
            staged,
            is_primary: false,
            description: String::new(),
        }
    }

    /// Name reported to the API
    pub fn file_name(&self) -> &str {
        self.staged.file_name()
    }
}

#[derive(Deserialize)]
struct DocumentUploadResponse {
    #[serde(default)]
    document: Option<StoredRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhotoUploadResponse {
    #[serde(default)]
    photo_url: Option<String>,
}

/// Drives uploads and deletions
#[derive(Debug, Clone)]
pub struct UploadDriver {
    api: ApiClient,
}

impl UploadDriver {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Upload `artifact` for `session`.
    ///
    /// Documents succeed only on HTTP 201, photos only on HTTP 200.
    #[tracing::instrument(
        name = "upload.artifact",
        skip(self, session, artifact),
        fields(identity = %session.identity().email, kind = %artifact.kind, bytes = artifact.staged.size())
    )]
    pub async fn upload(
        &self,
        session: &Session,
        artifact: &Artifact,
    ) -> Result<StoredRecordRef, UploadError> {
        let result = if artifact.kind.is_document() {
            self.upload_document(session, artifact).await
        } else {
            self.upload_photo(session, artifact).await
        };

        match &result {
            Ok(record) => {
                metrics::record_upload(artifact.kind, "success", artifact.staged.size());
                tracing::info!(
                    name = record.name.as_deref().unwrap_or(""),
                    size = record.size,
                    id = record.id,
                    "Upload accepted"
                );
            }
            Err(e) => {
                metrics::record_upload(artifact.kind, "failure", 0);
                tracing::warn!(error = %e, "Upload failed");
            }
        }
        result
    }

    async fn file_part(artifact: &Artifact) -> Result<Part, UploadError> {
        let data = artifact.staged.read().await?;
        Ok(Part::bytes(data)
            .file_name(artifact.file_name().to_string())
            .mime_str(artifact.kind.content_type())?)
    }

    async fn upload_document(
        &self,
        session: &Session,
        artifact: &Artifact,
    ) -> Result<StoredRecordRef, UploadError> {
        let form = Form::new()
            .part("document", Self::file_part(artifact).await?)
            .text("documentType", artifact.kind.as_str())
            .text("isPrimary", artifact.is_primary.to_string())
            .text("description", artifact.description.clone());

        let response = self
            .api
            .post_multipart(paths::DOCUMENTS, form, session.token())
            .await?;

        if response.status != StatusCode::CREATED {
            return Err(UploadError::Rejected {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }

        // The creation status is the success signal; the body is informational.
        let record = match response.json::<DocumentUploadResponse>() {
            Ok(DocumentUploadResponse {
                document: Some(record),
            }) => record,
            Ok(_) => StoredRecord::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Upload response body is not the expected JSON");
                StoredRecord::default()
            }
        };
        Ok(StoredRecordRef::from_document(artifact.kind, record))
    }

    async fn upload_photo(
        &self,
        session: &Session,
        artifact: &Artifact,
    ) -> Result<StoredRecordRef, UploadError> {
        let form = Form::new().part("photo", Self::file_part(artifact).await?);

        let response = self
            .api
            .post_multipart(paths::PHOTO, form, session.token())
            .await?;

        if response.status != StatusCode::OK {
            return Err(UploadError::Rejected {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }

        let body: PhotoUploadResponse = response
            .json()
            .map_err(|e| UploadError::MalformedResponse(e.to_string()))?;
        let url = body
            .photo_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| UploadError::MalformedResponse("response carries no photoUrl".into()))?;

        Ok(StoredRecordRef::from_photo(
            artifact.file_name(),
            artifact.staged.size(),
            url,
        ))
    }

    /// Delete a document record owned by `session`. Success only on HTTP 200.
    #[tracing::instrument(name = "upload.delete", skip(self, session), fields(identity = %session.identity().email))]
    pub async fn delete(&self, session: &Session, id: i64) -> Result<(), UploadError> {
        let response = self.api.delete(&paths::document(id), session.token()).await?;
        if response.status != StatusCode::OK {
            return Err(UploadError::Rejected {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }
        tracing::info!("Deleted document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabricate::StagingArea;
    use bytes::Bytes;

    #[test]
    fn test_document_artifact_metadata() {
        let staging = StagingArea::create(None).unwrap();
        let spec = crate::config::ScenarioConfig::default().documents[0].clone();
        let staged = staging.stage(&spec.file_name, Bytes::from("%PDF")).unwrap();

        let artifact = Artifact::document(&spec, staged);
        assert_eq!(artifact.kind, ArtifactKind::Cv);
        assert_eq!(artifact.file_name(), "test-cv.pdf");
        assert!(artifact.is_primary);
        assert_eq!(artifact.description, "Test cv document");
    }

    #[test]
    fn test_photo_artifact() {
        let staging = StagingArea::create(None).unwrap();
        let staged = staging.stage("test_demo.png", Bytes::from("png")).unwrap();

        let artifact = Artifact::photo(staged);
        assert_eq!(artifact.kind, ArtifactKind::ProfilePhoto);
        assert!(!artifact.is_primary);
    }

    #[test]
    fn test_record_ref_from_photo() {
        let record = StoredRecordRef::from_photo("p.png", 70, "/uploads/p.png".into());
        assert_eq!(record.kind, ArtifactKind::ProfilePhoto);
        assert_eq!(record.url.as_deref(), Some("/uploads/p.png"));
        assert_eq!(record.size, Some(70));
    }
}
