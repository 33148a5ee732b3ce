//! Run report
//!
//! One [`CaseResult`] per identity and artifact kind, plus the identities
//! that never authenticated, isolation mismatches and advisory findings.
//! The run passes only when every case passes and nothing else went wrong.

use crate::fabricate::ArtifactKind;
use crate::upload::StoredRecordRef;
use crate::verify::VerificationMismatch;
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::io::{self, Write};

const RULE_WIDTH: usize = 72;

/// Outcome for one (identity, kind) pair
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub identity: String,
    pub kind: ArtifactKind,
    pub uploaded: bool,
    pub verified: bool,
    /// Records of this kind found in the listing
    pub listed: usize,
    /// Bytes sent, summed over every upload of the case
    pub bytes: u64,
    pub record: Option<StoredRecordRef>,
    pub notes: Vec<String>,
}

impl CaseResult {
    pub fn new(identity: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            identity: identity.into(),
            kind,
            uploaded: false,
            verified: false,
            listed: 0,
            bytes: 0,
            record: None,
            notes: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.uploaded && self.verified
    }

    fn detail(&self) -> String {
        if !self.notes.is_empty() {
            return self.notes.join("; ");
        }
        let Some(record) = &self.record else {
            return String::new();
        };
        let mut detail = match (&record.name, &record.url) {
            (_, Some(url)) if self.kind == ArtifactKind::ProfilePhoto => url.clone(),
            (Some(name), _) => name.clone(),
            (None, Some(url)) => url.clone(),
            (None, None) => String::new(),
        };
        if self.listed > 1 {
            detail.push_str(&format!(" ({} listed)", self.listed));
        }
        detail
    }
}

/// An identity that did not authenticate and was left out of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedIdentity {
    pub identity: String,
    pub reason: String,
}

/// A finding reported without affecting the verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub identity: String,
    pub message: String,
}

/// Aggregated run results
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cases: Vec<CaseResult>,
    pub skipped: Vec<SkippedIdentity>,
    pub mismatches: Vec<VerificationMismatch>,
    pub advisories: Vec<Advisory>,
    /// Documents removed after verification
    pub deleted: usize,
}

impl ScenarioReport {
    /// Overall verdict.
    ///
    /// An empty run, a skipped identity or an isolation mismatch fails it,
    /// as does any failed case.
    pub fn passed(&self) -> bool {
        !self.cases.is_empty()
            && self.cases.iter().all(CaseResult::passed)
            && self.skipped.is_empty()
            && self.mismatches.is_empty()
    }

    pub fn failed_cases(&self) -> usize {
        self.cases.iter().filter(|c| !c.passed()).count()
    }

    /// Cases recorded for `identity`
    pub fn cases_for<'a>(&'a self, identity: &'a str) -> impl Iterator<Item = &'a CaseResult> {
        self.cases.iter().filter(move |c| c.identity == identity)
    }

    /// The case for `identity` and `kind`, if one was recorded
    pub fn case(&self, identity: &str, kind: ArtifactKind) -> Option<&CaseResult> {
        self.cases
            .iter()
            .find(|c| c.identity == identity && c.kind == kind)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Write the human-readable report to `out`
pub fn render<W: Write>(report: &ScenarioReport, out: &mut W) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    let identity_width = report
        .cases
        .iter()
        .map(|c| c.identity.len())
        .max()
        .unwrap_or(8)
        .max(8);

    writeln!(out, "{rule}")?;
    writeln!(out, "{}", style("Upload Verification Results").bold())?;
    writeln!(out, "API: {}", report.base_url)?;
    writeln!(
        out,
        "Run: {} ({} ms)",
        report.started_at.to_rfc3339(),
        (report.finished_at - report.started_at).num_milliseconds()
    )?;
    writeln!(out, "{rule}")?;

    for case in &report.cases {
        let verdict = if case.passed() {
            style(format!("{:<4}", "PASS")).green()
        } else {
            style(format!("{:<4}", "FAIL")).red()
        };
        writeln!(
            out,
            "{verdict} | {:<identity_width$} | {:<13} | Upload: {:<3} | Verified: {:<3} | {}",
            case.identity,
            case.kind.as_str(),
            yes_no(case.uploaded),
            yes_no(case.verified),
            case.detail(),
        )?;
    }

    if !report.skipped.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", style("Skipped identities:").yellow())?;
        for skipped in &report.skipped {
            writeln!(out, "  ! {}: {}", skipped.identity, skipped.reason)?;
        }
    }

    if !report.mismatches.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", style("Isolation mismatches:").red())?;
        for mismatch in &report.mismatches {
            writeln!(out, "  x {mismatch}")?;
        }
    }

    if !report.advisories.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", style("Advisories:").dim())?;
        for advisory in &report.advisories {
            writeln!(out, "  ~ {}: {}", advisory.identity, advisory.message)?;
        }
    }

    if report.deleted > 0 {
        writeln!(out)?;
        writeln!(out, "Deleted {} uploaded document(s)", report.deleted)?;
    }

    writeln!(out, "{rule}")?;
    if report.passed() {
        writeln!(out, "{}", style("ALL TESTS PASSED").green().bold())?;
    } else {
        writeln!(
            out,
            "{} ({} of {} cases failed)",
            style("SOME TESTS FAILED").red().bold(),
            report.failed_cases(),
            report.cases.len()
        )?;
    }
    writeln!(out, "{rule}")?;
    Ok(())
}
