//! Configuration module for the upload verifier
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every value a component
//! needs (API base URL, identities, scenario shape) is carried by [`Config`]
//! and handed to the component at construction.

use crate::fabricate::ArtifactKind;
use crate::session::Identity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

fn env_pattern() -> &'static regex_lite::Regex {
    static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var pattern is a valid regex")
    })
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in env_pattern().captures_iter(s) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build a configuration for `base_url` with the default scenario
    pub fn new(base_url: impl Into<String>, identities: Vec<Identity>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                probe_timeout_seconds: default_probe_timeout(),
            },
            identities,
            scenario: ScenarioConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    /// Policy applied when an identity fails to authenticate.
    ///
    /// Falls back to `abort` for a single identity and `skip` otherwise.
    pub fn on_auth_failure(&self) -> OnAuthFailure {
        self.scenario.on_auth_failure.unwrap_or(if self.identities.len() > 1 {
            OnAuthFailure::Skip
        } else {
            OnAuthFailure::Abort
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.api.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid API base URL '{}': must start with http:// or https://",
                self.api.base_url
            )));
        }

        if self.api.probe_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "probe_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.identities.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one identity must be configured".into(),
            ));
        }

        let mut emails = HashSet::new();
        for identity in &self.identities {
            if identity.email.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Identity email cannot be empty".into(),
                ));
            }
            if !emails.insert(identity.email.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "Identity '{}' is configured more than once",
                    identity.email
                )));
            }
        }

        let mut kinds = HashSet::new();
        for doc in &self.scenario.documents {
            if !doc.kind.is_document() {
                return Err(ConfigError::ValidationError(format!(
                    "'{}' is not a document kind",
                    doc.kind
                )));
            }
            if !kinds.insert(doc.kind) {
                return Err(ConfigError::ValidationError(format!(
                    "Document kind '{}' is listed more than once",
                    doc.kind
                )));
            }
            if doc.size_kb == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Document '{}' has size_kb of zero",
                    doc.file_name
                )));
            }
            if doc.size_kb.checked_mul(1024).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "Document '{}' has size_kb of {}, too large to fabricate",
                    doc.file_name, doc.size_kb
                )));
            }
            if doc.file_name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Document kind '{}' has an empty file_name",
                    doc.kind
                )));
            }
        }

        if self.scenario.documents.is_empty() && !self.scenario.photo.enabled {
            return Err(ConfigError::ValidationError(
                "Scenario has nothing to upload: no documents and photo disabled".into(),
            ));
        }

        Ok(())
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to (e.g. `http://localhost:3000/api`)
    pub base_url: String,
    /// Bounded wait for the advisory accessibility probe. Default: 5
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

fn default_probe_timeout() -> u64 {
    5
}

/// What to do when an identity cannot authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OnAuthFailure {
    /// Stop the whole scenario
    Abort,
    /// Record the identity as skipped and continue with the others
    Skip,
}

/// Scenario shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub on_auth_failure: Option<OnAuthFailure>,
    /// Parent directory of the per-run staging area. Default: system temp dir
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    #[serde(default = "default_documents")]
    pub documents: Vec<DocumentSpec>,
    #[serde(default)]
    pub photo: PhotoConfig,
    /// Delete the documents created by the run once verification is done
    #[serde(default)]
    pub delete_uploaded: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            on_auth_failure: None,
            staging_dir: None,
            documents: default_documents(),
            photo: PhotoConfig::default(),
            delete_uploaded: false,
        }
    }
}

fn default_documents() -> Vec<DocumentSpec> {
    [
        (ArtifactKind::Cv, "test-cv.pdf", 200),
        (ArtifactKind::CoverLetter, "test-cover-letter.pdf", 150),
        (ArtifactKind::IdDocument, "test-id.pdf", 300),
        (ArtifactKind::Certificate, "test-certificate.pdf", 250),
        (ArtifactKind::Reference, "test-reference.pdf", 180),
        (ArtifactKind::Portfolio, "test-portfolio.pdf", 400),
    ]
    .into_iter()
    .map(|(kind, file_name, size_kb)| DocumentSpec {
        kind,
        file_name: file_name.to_string(),
        size_kb,
        is_primary: true,
        description: None,
    })
    .collect()
}

/// One document upload case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSpec {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub size_kb: usize,
    #[serde(default = "default_true")]
    pub is_primary: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl DocumentSpec {
    /// Target payload size in bytes
    pub fn target_size(&self) -> usize {
        self.size_kb.saturating_mul(1024)
    }

    /// Description sent with the upload
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Test {} document", self.kind))
    }
}

fn default_true() -> bool {
    true
}

/// Profile photo cases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Upload a second photo per identity and check it replaces the first
    #[serde(default)]
    pub verify_overwrite: bool,
    /// HEAD each photo URL after verification (advisory only)
    #[serde(default = "default_true")]
    pub probe_accessibility: bool,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_overwrite: false,
            probe_accessibility: true,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Write the Prometheus text exposition here after the run
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}
