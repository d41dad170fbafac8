//! Verdict reporting
//!
//! Renders a [`ParityReport`] into its persisted shape. Rendering is a pure
//! transformation; the report itself is never modified.

use crate::certifier::{FailureDetail, ParityReport, Verdict};
use crate::error::{Error, Result};
use parity_gen::OutputKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default cap on failure detail entries
pub const DEFAULT_MAX_FAILURE_DETAILS: usize = 20;
/// Base name of written report files
pub const REPORT_FILE_STEM: &str = "parity-report";

/// Output format for a rendered report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
    /// Markdown certificate
    Markdown,
}

impl ReportFormat {
    /// Get all formats
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Json, Self::Yaml, Self::Markdown]
    }

    /// File extension for this format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Markdown => "md",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

/// Canonical persisted report shape
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument<'a> {
    /// CERTIFIED, FAILED or INCONCLUSIVE
    pub status: Verdict,
    /// Comparison strategy used
    pub output_kind: OutputKind,
    /// Number of test cases
    pub test_cases: usize,
    /// Test cases that did not match
    pub failures: usize,
    /// Largest deviation (fraction)
    pub max_deviation: f64,
    /// Mean deviation (fraction)
    pub mean_deviation: f64,
    /// Confidence (fraction)
    pub confidence: f64,
    /// pass, fail or not-applicable
    pub distribution_test: crate::certifier::DistributionVerdict,
    /// Kolmogorov–Smirnov statistic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ks_statistic: Option<f64>,
    /// Kolmogorov–Smirnov p-value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ks_p_value: Option<f64>,
    /// Leading failures, capped
    pub failure_details: &'a [FailureDetail],
    /// Whether failures beyond the cap were omitted
    pub failure_details_truncated: bool,
}

/// Renders and persists parity reports
#[derive(Debug, Clone)]
pub struct VerdictReporter {
    max_failure_details: usize,
}

impl Default for VerdictReporter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURE_DETAILS)
    }
}

impl VerdictReporter {
    /// Reporter keeping at most `max_failure_details` failure entries
    #[must_use]
    pub const fn new(max_failure_details: usize) -> Self {
        Self {
            max_failure_details,
        }
    }

    /// Cap on failure detail entries
    #[must_use]
    pub const fn max_failure_details(&self) -> usize {
        self.max_failure_details
    }

    /// Canonical document view of `report`
    #[must_use]
    pub fn document<'a>(&self, report: &'a ParityReport) -> ReportDocument<'a> {
        let shown = report.failure_details.len().min(self.max_failure_details);
        ReportDocument {
            status: report.status,
            output_kind: report.output_kind,
            test_cases: report.test_cases,
            failures: report.failures,
            max_deviation: report.max_deviation,
            mean_deviation: report.mean_deviation,
            confidence: report.confidence,
            distribution_test: report.distribution_test,
            ks_statistic: report.ks_statistic,
            ks_p_value: report.ks_p_value,
            failure_details: &report.failure_details[..shown],
            failure_details_truncated: shown < report.failure_details.len(),
        }
    }

    /// Render `report` as `format`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(&self, report: &ParityReport, format: ReportFormat) -> Result<String> {
        let document = self.document(report);
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(&document)?),
            ReportFormat::Yaml => Ok(serde_yaml::to_string(&document)?),
            ReportFormat::Markdown => Ok(self.to_markdown(&document)),
        }
    }

    /// Write `report` into `dir` as `parity-report.<ext>`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn write_to_dir(
        &self,
        report: &ParityReport,
        dir: impl AsRef<Path>,
        format: ReportFormat,
    ) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{REPORT_FILE_STEM}.{}", format.extension()));
        std::fs::write(&path, self.render(report, format)?)?;
        log::info!("wrote {} report to {}", report.status, path.display());
        Ok(path)
    }

    /// Markdown certificate for a document
    #[must_use]
    pub fn to_markdown(&self, document: &ReportDocument<'_>) -> String {
        let ks = match (document.ks_statistic, document.ks_p_value) {
            (Some(statistic), Some(p_value)) => format!("D = {statistic:.6}, p = {p_value:.6}"),
            _ => "-".to_string(),
        };
        let mut out = format!(
            r#"# Parity Certificate

{badge}

## Summary

| Metric | Value |
|--------|-------|
| **Status** | **{status}** |
| **Output Kind** | `{kind}` |
| **Test Cases** | {test_cases} |
| **Failures** | {failures} |
| **Max Deviation** | {max_deviation:e} |
| **Mean Deviation** | {mean_deviation:e} |
| **Confidence** | {confidence:.4}% |
| **Distribution Test** | {distribution} ({ks}) |
"#,
            badge = badge(document.status),
            status = document.status,
            kind = document.output_kind,
            test_cases = document.test_cases,
            failures = document.failures,
            max_deviation = document.max_deviation,
            mean_deviation = document.mean_deviation,
            confidence = document.confidence * 100.0,
            distribution = document.distribution_test,
        );

        if !document.failure_details.is_empty() {
            out.push_str("\n## Failures\n\n");
            out.push_str("| Case | Reason | Deviation | Reference | Candidate |\n");
            out.push_str("|------|--------|-----------|-----------|-----------|\n");
            for failure in document.failure_details {
                let (reference, candidate) = failure.outputs.as_ref().map_or_else(
                    || (String::new(), String::new()),
                    |o| (cell(&o.reference), cell(&o.candidate)),
                );
                out.push_str(&format!(
                    "| {} | {} | {:e} | `{}` | `{}` |\n",
                    failure.index, failure.reason, failure.deviation, reference, candidate
                ));
            }
            if document.failure_details_truncated {
                out.push_str(&format!(
                    "\n*Showing first {} of {} failures.*\n",
                    document.failure_details.len(),
                    document.failures
                ));
            }
        }

        out.push_str(
            "\n---\n\n*Confidence is the 99% Wilson score lower bound of the pass rate.*\n",
        );
        out
    }
}

fn badge(status: Verdict) -> &'static str {
    match status {
        Verdict::Certified => "![Certified](https://img.shields.io/badge/parity-CERTIFIED-green)",
        Verdict::Failed => "![Failed](https://img.shields.io/badge/parity-FAILED-red)",
        Verdict::Inconclusive => {
            "![Inconclusive](https://img.shields.io/badge/parity-INCONCLUSIVE-lightgrey)"
        }
    }
}

/// Escape a value for a markdown table cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
