//! Prometheus text exposition export
//!
//! Writes the default registry in the text format understood by the
//! node-exporter textfile collector.
//!
//! # Example
//!
//! ```no_run
//! use upload_verifier::metrics::write_textfile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! write_textfile("/var/lib/node_exporter/upload_verifier.prom")?;
//! # Ok(())
//! # }
//! ```

use prometheus::{Encoder, TextEncoder};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metrics export errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("Metrics output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Failed to write metrics to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Render all registered metrics in the text exposition format
pub fn render() -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Write all registered metrics to `path`.
///
/// The file is written next to its destination and renamed into place, so a
/// collector never reads a partial file.
pub fn write_textfile<P: AsRef<Path>>(path: P) -> Result<(), MetricsError> {
    let path = path.as_ref();
    let body = render()?;
    let staging = path.with_extension("prom.tmp");

    let write_err = |source| MetricsError::Write {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&staging, body).map_err(write_err)?;
    std::fs::rename(&staging, path).map_err(write_err)?;

    tracing::info!(path = %path.display(), "Wrote metrics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        crate::metrics::record_auth_attempt("success");
        let body = render().unwrap();
        assert!(body.contains("upload_verifier_auth_attempts_total"));
    }

    #[test]
    fn test_write_textfile() {
        crate::metrics::record_verification("round_trip", true);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verifier.prom");

        write_textfile(&path).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("upload_verifier_verifications_total"));
        assert!(!dir.path().join("verifier.prom.tmp").exists());
    }

    #[test]
    fn test_write_textfile_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("verifier.prom");
        assert!(matches!(
            write_textfile(&path),
            Err(MetricsError::Write { .. })
        ));
    }
}
