//! Upload Verifier Library
//!
//! End-to-end verification harness for a multi-tenant file-upload API.
//!
//! # Features
//!
//! - **Fabricated Artifacts**: Valid PDFs of exact size and distinct 1x1 PNGs
//! - **Multi-Identity**: Logs in several users and uploads on behalf of each
//! - **Persistence Checks**: Reads records and profile photos back after upload
//! - **Isolation Checks**: Detects photo URLs or records shared across identities
//! - **Clean Runs**: Staged files are removed on every exit path
//!
//! # Example
//!
//! ```no_run
//! use upload_verifier::{config::Config, scenario::ScenarioRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("verifier.yaml")?;
//!     let runner = ScenarioRunner::new(config)?;
//!     let report = runner.run().await?;
//!     println!("passed: {}", report.passed());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod fabricate;
pub mod metrics;
pub mod scenario;
pub mod session;
pub mod upload;
pub mod verify;

// Re-export commonly used types
pub use config::Config;
pub use scenario::{ScenarioReport, ScenarioRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
