//! Metrics module
//!
//! Prometheus counters for the verification run. The run is short-lived, so
//! metrics are exported as a text file once it finishes instead of being
//! scraped.

pub mod textfile;

use crate::fabricate::ArtifactKind;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

pub use textfile::{render, write_textfile, MetricsError};

lazy_static! {
    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "upload_verifier_auth_attempts_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "upload_verifier_uploads_total",
        "Uploads by artifact kind and outcome",
        &["kind", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "upload_verifier_upload_bytes_total",
        "Bytes of accepted uploads"
    ).unwrap();

    // Verification metrics
    pub static ref VERIFICATIONS_TOTAL: CounterVec = register_counter_vec!(
        "upload_verifier_verifications_total",
        "Verification checks by check and outcome",
        &["check", "status"]
    ).unwrap();

    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "upload_verifier_request_duration_seconds",
        "API request duration in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();
}

/// Record a login attempt (`success`, `rejected` or `error`)
pub fn record_auth_attempt(status: &str) {
    AUTH_ATTEMPTS.with_label_values(&[status]).inc();
}

/// Record an upload outcome
pub fn record_upload(kind: ArtifactKind, status: &str, bytes: u64) {
    UPLOADS_TOTAL
        .with_label_values(&[kind.as_str(), status])
        .inc();
    if bytes > 0 {
        UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    }
}

/// Record a verification check outcome
pub fn record_verification(check: &str, passed: bool) {
    let status = if passed { "pass" } else { "fail" };
    VERIFICATIONS_TOTAL.with_label_values(&[check, status]).inc();
}

/// Record API request duration
pub fn record_request_duration(operation: &str, duration_secs: f64) {
    REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}
