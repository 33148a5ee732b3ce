//! State verification
//!
//! Re-reads what the API stored for each session and checks it against what
//! was uploaded: presence per kind, photo round trip, photo overwrite, and
//! isolation between identities (unique photo URLs, disjoint record ids).
//!
//! Remote reads live on [`StateVerifier`]; the checks themselves are plain
//! functions over the observed data so the runner can evaluate them once all
//! uploads are done.

use crate::api::{paths, ApiClient, ApiError};
use crate::fabricate::ArtifactKind;
use crate::metrics;
use crate::session::Session;
use crate::upload::{StoredRecord, StoredRecordRef};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors reading state back from the API
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Request rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(#[from] ApiError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Observed state disagrees with what was uploaded
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationMismatch {
    #[error("{identity}: no '{kind}' record in listing")]
    MissingRecord {
        identity: String,
        kind: ArtifactKind,
    },

    #[error("{identity}: profile photo is {actual:?}, expected {expected}")]
    PhotoUrlMismatch {
        identity: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("{identity}: profile still shows the replaced photo {previous}")]
    StalePhoto { identity: String, previous: String },

    #[error("{identity}: upload of '{kind}' reported {detail}")]
    ReportedRecord {
        identity: String,
        kind: ArtifactKind,
        detail: String,
    },

    #[error("photo URL {url} is shared by {}", .identities.join(", "))]
    DuplicatePhotoUrl { url: String, identities: Vec<String> },

    #[error("record {id} is listed for {}", .identities.join(", "))]
    SharedRecord { id: i64, identities: Vec<String> },
}

/// Result of the advisory accessibility probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Accessible {
        status: u16,
        content_type: Option<String>,
    },
    Unexpected {
        status: u16,
    },
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_accessible(&self) -> bool {
        matches!(self, ProbeOutcome::Accessible { .. })
    }
}

#[derive(Deserialize)]
struct DocumentListResponse {
    #[serde(default)]
    documents: Vec<StoredRecord>,
}

#[derive(Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    profile: Option<ProfileBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBody {
    #[serde(default)]
    profile_photo_url: Option<String>,
}

/// Reads stored state back through a session
#[derive(Debug, Clone)]
pub struct StateVerifier {
    api: ApiClient,
}

impl StateVerifier {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Every document record visible to `session`
    #[tracing::instrument(name = "verify.list_records", skip(self, session), fields(identity = %session.identity().email))]
    pub async fn list_records(&self, session: &Session) -> Result<Vec<StoredRecord>, VerifyError> {
        let response = self.api.get(paths::DOCUMENTS, session.token()).await?;
        if response.status != StatusCode::OK {
            return Err(VerifyError::Rejected {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }
        let listing: DocumentListResponse = response
            .json()
            .map_err(|e| VerifyError::MalformedResponse(e.to_string()))?;

        tracing::info!(count = listing.documents.len(), "Retrieved documents");
        Ok(listing.documents)
    }

    /// Current profile photo URL of `session`, if any
    #[tracing::instrument(name = "verify.profile_photo", skip(self, session), fields(identity = %session.identity().email))]
    pub async fn get_profile_photo(&self, session: &Session) -> Result<Option<String>, VerifyError> {
        let response = self.api.get(paths::PROFILE, session.token()).await?;
        if response.status != StatusCode::OK {
            return Err(VerifyError::Rejected {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }
        let profile: ProfileResponse = response
            .json()
            .map_err(|e| VerifyError::MalformedResponse(e.to_string()))?;

        Ok(profile
            .profile
            .and_then(|p| p.profile_photo_url)
            .filter(|url| !url.is_empty()))
    }

    /// HEAD `url` with the bounded probe timeout. Never fails the run.
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let target = match self.api.resolve(url) {
            Ok(target) => target,
            Err(e) => return ProbeOutcome::Unreachable(e.to_string()),
        };
        match self.api.head(target).await {
            Ok(response) if response.status == StatusCode::OK => ProbeOutcome::Accessible {
                status: response.status.as_u16(),
                content_type: response.content_type,
            },
            Ok(response) => ProbeOutcome::Unexpected {
                status: response.status.as_u16(),
            },
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}

// ============================================================================
// Checks
// ============================================================================

/// Records of one listing grouped by kind. Several records may share a kind.
pub type KindIndex<'a> = BTreeMap<ArtifactKind, Vec<&'a StoredRecord>>;

/// Group a listing by kind, ignoring document types outside the enumeration
pub fn group_by_kind(records: &[StoredRecord]) -> KindIndex<'_> {
    let mut index = KindIndex::new();
    for record in records {
        match record.kind() {
            Some(kind) => index.entry(kind).or_default().push(record),
            None => tracing::debug!(
                document_type = record.document_type.as_deref().unwrap_or(""),
                "Ignoring record of unknown kind"
            ),
        }
    }
    index
}

/// At least one record of `kind` must be listed. Returns how many were.
pub fn check_presence(
    identity: &str,
    kind: ArtifactKind,
    index: &KindIndex<'_>,
) -> Result<usize, VerificationMismatch> {
    let count = index.get(&kind).map_or(0, Vec::len);
    metrics::record_verification("presence", count > 0);
    if count == 0 {
        return Err(VerificationMismatch::MissingRecord {
            identity: identity.to_string(),
            kind,
        });
    }
    Ok(count)
}

/// Reported sizes may differ from the bytes sent by at most 1/50th.
const REPORTED_SIZE_TOLERANCE_DIVISOR: u64 = 50;

/// What the server reported at upload must describe the file that was sent.
///
/// Fields the server left out are not checked; a name reported empty or a
/// size far from `sent_bytes` is a mismatch.
pub fn check_reported_record(
    identity: &str,
    record: &StoredRecordRef,
    sent_bytes: u64,
) -> Result<(), VerificationMismatch> {
    let mismatch = |detail: String| VerificationMismatch::ReportedRecord {
        identity: identity.to_string(),
        kind: record.kind,
        detail,
    };

    let result = match (&record.name, record.size) {
        (Some(name), _) if name.trim().is_empty() => Err(mismatch("an empty name".into())),
        (_, Some(size))
            if size
                .abs_diff(sent_bytes)
                .saturating_mul(REPORTED_SIZE_TOLERANCE_DIVISOR)
                > sent_bytes =>
        {
            Err(mismatch(format!("{size} bytes, sent {sent_bytes}")))
        }
        _ => Ok(()),
    };
    metrics::record_verification("reported_record", result.is_ok());
    result
}

/// The URL returned at upload must be the one the profile shows
pub fn check_photo_round_trip(
    identity: &str,
    uploaded: &str,
    observed: Option<&str>,
) -> Result<(), VerificationMismatch> {
    let passed = observed == Some(uploaded);
    metrics::record_verification("round_trip", passed);
    if passed {
        Ok(())
    } else {
        Err(VerificationMismatch::PhotoUrlMismatch {
            identity: identity.to_string(),
            expected: uploaded.to_string(),
            actual: observed.map(str::to_string),
        })
    }
}

/// After a second upload the profile must show the second photo.
///
/// `first` and `second` may be equal when the store is content-addressed.
pub fn check_photo_overwrite(
    identity: &str,
    first: &str,
    second: &str,
    observed: Option<&str>,
) -> Result<(), VerificationMismatch> {
    let result = match observed {
        Some(current) if current == second => Ok(()),
        Some(current) if current == first => Err(VerificationMismatch::StalePhoto {
            identity: identity.to_string(),
            previous: first.to_string(),
        }),
        _ => Err(VerificationMismatch::PhotoUrlMismatch {
            identity: identity.to_string(),
            expected: second.to_string(),
            actual: observed.map(str::to_string),
        }),
    };
    metrics::record_verification("overwrite", result.is_ok());
    result
}

/// No URL may be handed out to two different identities.
///
/// `observed` holds every `(identity, url)` pair seen during the run. A URL
/// repeated by the same identity is allowed (content-addressed stores).
pub fn check_photo_uniqueness(observed: &[(String, String)]) -> Vec<VerificationMismatch> {
    let mut by_url: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (identity, url) in observed {
        let owners = by_url.entry(url.as_str()).or_default();
        if !owners.contains(identity) {
            owners.push(identity.clone());
        }
    }

    let mismatches: Vec<_> = by_url
        .into_iter()
        .filter(|(_, identities)| identities.len() > 1)
        .map(|(url, identities)| VerificationMismatch::DuplicatePhotoUrl {
            url: url.to_string(),
            identities,
        })
        .collect();
    metrics::record_verification("uniqueness", mismatches.is_empty());
    mismatches
}

/// No record id may appear in more than one identity's listing
pub fn check_record_disjointness(listings: &[(String, Vec<StoredRecord>)]) -> Vec<VerificationMismatch> {
    let mut owners: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for (identity, records) in listings {
        for id in records.iter().filter_map(|r| r.id) {
            let seen = owners.entry(id).or_default();
            if !seen.contains(identity) {
                seen.push(identity.clone());
            }
        }
    }

    let mismatches: Vec<_> = owners
        .into_iter()
        .filter(|(_, identities)| identities.len() > 1)
        .map(|(id, identities)| VerificationMismatch::SharedRecord { id, identities })
        .collect();
    metrics::record_verification("disjointness", mismatches.is_empty());
    mismatches
}
