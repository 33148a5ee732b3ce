//! Scenario runner
//!
//! Drives one verification run end to end:
//!
//! 1. fabricate every artifact into a staging area
//! 2. authenticate each identity (abort or skip on failure)
//! 3. upload every document kind and the profile photo per identity
//! 4. verify presence, photo round trip and isolation, after all uploads
//! 5. probe photo URLs and delete created documents, when configured
//! 6. remove the staging area on every path
//!
//! Requests are issued one at a time; each step waits for the previous one.

use crate::api::{ApiClient, ApiError};
use crate::config::{Config, ConfigError, OnAuthFailure};
use crate::fabricate::{fabricate, ArtifactKind, StagingArea, StagingError};
use crate::session::{AuthError, Session, SessionManager};
use crate::upload::{Artifact, StoredRecord, UploadDriver};
use crate::verify::{self, ProbeOutcome, StateVerifier, VerificationMismatch};
use chrono::Utc;
use thiserror::Error;

pub mod report;

pub use report::{render, Advisory, CaseResult, ScenarioReport, SkippedIdentity};

/// Errors that end a run before it can produce a report
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build API client: {0}")]
    Client(#[from] ApiError),

    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Failed to remove staging area: {0}")]
    Cleanup(#[source] StagingError),

    #[error("Authentication failed for {identity}, aborting: {source}")]
    AuthAborted {
        identity: String,
        #[source]
        source: AuthError,
    },
}

/// An authenticated identity and its cases
struct Participant {
    index: usize,
    session: Session,
    cases: Vec<CaseResult>,
    /// Photo URLs returned by successful uploads, in upload order
    photo_urls: Vec<String>,
}

impl Participant {
    fn email(&self) -> &str {
        &self.session.identity().email
    }

    fn photo_case(&mut self) -> Option<&mut CaseResult> {
        self.cases
            .iter_mut()
            .find(|case| case.kind == ArtifactKind::ProfilePhoto)
    }
}

/// Fabricated inputs, built before any request is made
struct Inputs {
    documents: Vec<Artifact>,
    /// Photo artifacts per identity index (one, or two for the overwrite check)
    photos: Vec<Vec<Artifact>>,
}

/// Combine the run outcome with the staging cleanup result.
///
/// A run error takes precedence; a cleanup failure alongside it is logged
/// so leftover files are never silent.
fn finish(
    outcome: Result<ScenarioReport, ScenarioError>,
    cleanup: Result<(), StagingError>,
) -> Result<ScenarioReport, ScenarioError> {
    match (outcome, cleanup) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => {
            tracing::error!(error = %e, "Failed to remove staging area");
            Err(ScenarioError::Cleanup(e))
        }
        (Err(run), Err(e)) => {
            tracing::error!(error = %e, run_error = %run, "Failed to remove staging area after failed run");
            Err(run)
        }
        (Err(run), Ok(())) => Err(run),
    }
}

/// Runs the verification scenario described by a [`Config`]
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    config: Config,
    sessions: SessionManager,
    uploads: UploadDriver,
    verifier: StateVerifier,
}

impl ScenarioRunner {
    /// Validate `config` and build the components for it
    pub fn new(config: Config) -> Result<Self, ScenarioError> {
        config.validate()?;
        let api = ApiClient::new(&config.api)?;
        Ok(Self {
            sessions: SessionManager::new(api.clone()),
            uploads: UploadDriver::new(api.clone()),
            verifier: StateVerifier::new(api),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the scenario.
    ///
    /// The staging area is removed whatever the outcome. A cleanup failure
    /// turns an otherwise finished run into an error.
    pub async fn run(&self) -> Result<ScenarioReport, ScenarioError> {
        let staging = StagingArea::create(self.config.scenario.staging_dir.as_deref())?;
        let outcome = self.run_staged(&staging).await;
        finish(outcome, staging.cleanup())
    }

    async fn run_staged(&self, staging: &StagingArea) -> Result<ScenarioReport, ScenarioError> {
        let started_at = Utc::now();
        let inputs = self.fabricate_inputs(staging)?;
        tracing::info!(
            files = staging.file_count(),
            path = %staging.root().display(),
            "Fabricated artifacts"
        );

        let (mut participants, skipped) = self.authenticate_all().await?;

        for participant in &mut participants {
            self.upload_all(participant, &inputs).await;
        }

        let mut mismatches = Vec::new();
        let mut listings = Vec::new();
        for participant in &mut participants {
            if let Some(records) = self.verify_participant(participant).await {
                listings.push((participant.email().to_string(), records));
            }
        }
        mismatches.extend(self.verify_isolation(&mut participants, &listings));

        let mut advisories = Vec::new();
        if self.config.scenario.photo.probe_accessibility {
            advisories.extend(self.probe_photos(&participants).await);
        }

        let mut deleted = 0;
        if self.config.scenario.delete_uploaded {
            let (count, failures) = self.delete_uploaded(&participants).await;
            deleted = count;
            advisories.extend(failures);
        }

        Ok(ScenarioReport {
            base_url: self.config.api.base_url.clone(),
            started_at,
            finished_at: Utc::now(),
            cases: participants.into_iter().flat_map(|p| p.cases).collect(),
            skipped,
            mismatches,
            advisories,
            deleted,
        })
    }

    fn fabricate_inputs(&self, staging: &StagingArea) -> Result<Inputs, StagingError> {
        let documents = self
            .config
            .scenario
            .documents
            .iter()
            .map(|spec| {
                let data = fabricate(spec.kind, spec.target_size(), 0);
                Ok(Artifact::document(spec, staging.stage(&spec.file_name, data)?))
            })
            .collect::<Result<Vec<_>, StagingError>>()?;

        let photo = &self.config.scenario.photo;
        let identity_count = self.config.identities.len();
        let mut photos = Vec::with_capacity(identity_count);
        for (index, identity) in self.config.identities.iter().enumerate() {
            let mut artifacts = Vec::new();
            if photo.enabled {
                // Distinct seed per identity and per upload, so no two photos share bytes.
                let first = fabricate(ArtifactKind::ProfilePhoto, 0, index as u64);
                let name = format!("test_{}.png", identity.slug());
                artifacts.push(Artifact::photo(staging.stage(&name, first)?));

                if photo.verify_overwrite {
                    let second =
                        fabricate(ArtifactKind::ProfilePhoto, 0, (identity_count + index) as u64);
                    let name = format!("test_{}_2.png", identity.slug());
                    artifacts.push(Artifact::photo(staging.stage(&name, second)?));
                }
            }
            photos.push(artifacts);
        }

        Ok(Inputs { documents, photos })
    }

    async fn authenticate_all(
        &self,
    ) -> Result<(Vec<Participant>, Vec<SkippedIdentity>), ScenarioError> {
        let policy = self.config.on_auth_failure();
        let mut participants = Vec::new();
        let mut skipped = Vec::new();

        for (index, identity) in self.config.identities.iter().enumerate() {
            match self.sessions.authenticate(identity).await {
                Ok(session) => participants.push(Participant {
                    index,
                    session,
                    cases: Vec::new(),
                    photo_urls: Vec::new(),
                }),
                Err(source) => match policy {
                    OnAuthFailure::Abort => {
                        tracing::error!(identity = %identity.email, error = %source, "Login failed, aborting");
                        return Err(ScenarioError::AuthAborted {
                            identity: identity.email.clone(),
                            source,
                        });
                    }
                    OnAuthFailure::Skip => {
                        tracing::warn!(identity = %identity.email, error = %source, "Login failed, skipping identity");
                        skipped.push(SkippedIdentity {
                            identity: identity.email.clone(),
                            reason: source.to_string(),
                        });
                    }
                },
            }
        }

        Ok((participants, skipped))
    }

    async fn upload_all(&self, participant: &mut Participant, inputs: &Inputs) {
        for artifact in &inputs.documents {
            let mut case = CaseResult::new(participant.email(), artifact.kind);
            case.bytes = artifact.staged.size();
            match self.uploads.upload(&participant.session, artifact).await {
                Ok(record) => {
                    case.uploaded = true;
                    case.record = Some(record);
                }
                Err(e) => case.notes.push(format!("upload: {e}")),
            }
            participant.cases.push(case);
        }

        let photos = inputs
            .photos
            .get(participant.index)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if photos.is_empty() {
            return;
        }

        let mut case = CaseResult::new(participant.email(), ArtifactKind::ProfilePhoto);
        case.uploaded = true;
        for (attempt, artifact) in photos.iter().enumerate() {
            case.bytes += artifact.staged.size();
            match self.uploads.upload(&participant.session, artifact).await {
                Ok(record) => {
                    if let Some(url) = &record.url {
                        participant.photo_urls.push(url.clone());
                    }
                    case.record = Some(record);
                }
                Err(e) => {
                    case.uploaded = false;
                    case.notes.push(format!("upload #{}: {e}", attempt + 1));
                }
            }
        }
        participant.cases.push(case);
    }

    /// Presence and photo checks for one participant. Returns its listing.
    async fn verify_participant(&self, participant: &mut Participant) -> Option<Vec<StoredRecord>> {
        let identity = participant.email().to_string();
        let has_documents = participant.cases.iter().any(|c| c.kind.is_document());

        let listing = if has_documents {
            match self.verifier.list_records(&participant.session).await {
                Ok(records) => Some(records),
                Err(e) => {
                    tracing::warn!(identity = %identity, error = %e, "Listing failed");
                    for case in participant.cases.iter_mut().filter(|c| c.kind.is_document()) {
                        case.verified = false;
                        case.notes.push(format!("listing: {e}"));
                    }
                    None
                }
            }
        } else {
            None
        };

        if let Some(records) = &listing {
            let index = verify::group_by_kind(records);
            for case in participant.cases.iter_mut().filter(|c| c.kind.is_document()) {
                match verify::check_presence(&identity, case.kind, &index) {
                    Ok(count) => {
                        case.verified = true;
                        case.listed = count;
                    }
                    Err(mismatch) => {
                        case.verified = false;
                        case.notes.push(mismatch.to_string());
                    }
                }
                if let Some(record) = &case.record {
                    if let Err(mismatch) =
                        verify::check_reported_record(&identity, record, case.bytes)
                    {
                        case.verified = false;
                        case.notes.push(mismatch.to_string());
                    }
                }
            }
        }

        self.verify_photo(participant).await;
        listing
    }

    async fn verify_photo(&self, participant: &mut Participant) {
        let identity = participant.email().to_string();
        let urls = participant.photo_urls.clone();
        let Some(last) = urls.last() else {
            if let Some(case) = participant.photo_case() {
                case.notes.push("no photo URL to verify".into());
            }
            return;
        };

        let observed = self.verifier.get_profile_photo(&participant.session).await;
        let Some(case) = participant.photo_case() else {
            return;
        };

        let observed = match observed {
            Ok(observed) => observed,
            Err(e) => {
                case.notes.push(format!("profile: {e}"));
                return;
            }
        };

        let check = match urls.as_slice() {
            [first, .., second] => {
                if first == second {
                    case.notes.push("second upload returned the same URL".into());
                }
                verify::check_photo_overwrite(&identity, first, second, observed.as_deref())
            }
            _ => verify::check_photo_round_trip(&identity, last, observed.as_deref()),
        };

        match check {
            Ok(()) => case.verified = true,
            Err(mismatch) => {
                case.verified = false;
                case.notes.push(mismatch.to_string());
            }
        }
    }

    /// Cross-identity checks: unique photo URLs and disjoint record ids
    fn verify_isolation(
        &self,
        participants: &mut [Participant],
        listings: &[(String, Vec<StoredRecord>)],
    ) -> Vec<VerificationMismatch> {
        let mut mismatches = Vec::new();

        // Every URL an identity was given counts, not only its current one.
        let photo_urls: Vec<(String, String)> = participants
            .iter()
            .flat_map(|p| {
                p.photo_urls
                    .iter()
                    .map(move |url| (p.email().to_string(), url.clone()))
            })
            .collect();
        let with_photos = participants
            .iter()
            .filter(|p| !p.photo_urls.is_empty())
            .count();
        if with_photos >= 2 {
            for mismatch in verify::check_photo_uniqueness(&photo_urls) {
                if let VerificationMismatch::DuplicatePhotoUrl { identities, .. } = &mismatch {
                    for participant in participants
                        .iter_mut()
                        .filter(|p| identities.iter().any(|i| i == p.email()))
                    {
                        if let Some(case) = participant.photo_case() {
                            case.verified = false;
                            case.notes.push(mismatch.to_string());
                        }
                    }
                }
                tracing::error!(%mismatch, "Photo storage aliased between identities");
                mismatches.push(mismatch);
            }
        } else {
            tracing::info!("Fewer than two identities with photos, uniqueness check skipped");
        }

        if listings.len() >= 2 {
            for mismatch in verify::check_record_disjointness(listings) {
                tracing::error!(%mismatch, "Record visible to more than one identity");
                mismatches.push(mismatch);
            }
        }

        mismatches
    }

    async fn probe_photos(&self, participants: &[Participant]) -> Vec<Advisory> {
        let mut advisories = Vec::new();
        for participant in participants {
            let Some(url) = participant.photo_urls.last() else {
                continue;
            };
            let message = match self.verifier.probe(url).await {
                ProbeOutcome::Accessible { content_type, .. } => format!(
                    "photo {url} is accessible ({})",
                    content_type.as_deref().unwrap_or("unknown type")
                ),
                ProbeOutcome::Unexpected { status } => {
                    format!("photo {url} returned HTTP {status}")
                }
                ProbeOutcome::Unreachable(reason) => {
                    format!("photo {url} is unreachable: {reason}")
                }
            };
            advisories.push(Advisory {
                identity: participant.email().to_string(),
                message,
            });
        }
        advisories
    }

    async fn delete_uploaded(&self, participants: &[Participant]) -> (usize, Vec<Advisory>) {
        let mut deleted = 0;
        let mut failures = Vec::new();
        for participant in participants {
            let ids = participant
                .cases
                .iter()
                .filter(|c| c.kind.is_document())
                .filter_map(|c| c.record.as_ref()?.id);
            for id in ids {
                match self.uploads.delete(&participant.session, id).await {
                    Ok(()) => deleted += 1,
                    Err(e) => failures.push(Advisory {
                        identity: participant.email().to_string(),
                        message: format!("failed to delete document {id}: {e}"),
                    }),
                }
            }
        }
        (deleted, failures)
    }
}
