//! Data models for the exception analyzer.
//!
//! This module contains the structures that flow through the pipeline:
//! the inbound audit report, the per-batch payloads returned by the
//! inference service, and the combined analysis handed to the renderers.

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single exception record. The schema is owned by the caller; records
/// are passed through verbatim.
pub type ExceptionRecord = Value;

/// Severity level used when counting exceptions and findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a free-form label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// The inbound request envelope: `{ "audit_report": { ... } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditRequest {
    #[serde(default)]
    pub audit_report: Option<AuditReport>,
}

impl AuditRequest {
    /// Check the envelope preconditions and hand back the report.
    pub fn into_report(self) -> Result<AuditReport, PipelineError> {
        let report = self.audit_report.ok_or_else(|| {
            PipelineError::Precondition("Data must contain 'audit_report' object".to_string())
        })?;
        report.validate()?;
        Ok(report)
    }
}

/// A structured audit report for one branch and period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default)]
    pub exceptions: Vec<ExceptionRecord>,
}

impl AuditReport {
    #[allow(dead_code)] // Constructor for programmatic callers and tests
    pub fn new(
        branch: impl Into<String>,
        period: impl Into<String>,
        exceptions: Vec<ExceptionRecord>,
    ) -> Self {
        Self {
            branch: Some(branch.into()),
            period: Some(period.into()),
            exceptions,
        }
    }

    /// Branch name, or a placeholder when the report omits it.
    pub fn branch_name(&self) -> &str {
        self.branch.as_deref().unwrap_or("Unknown branch")
    }

    /// Reporting period, or a placeholder when the report omits it.
    pub fn period_name(&self) -> &str {
        self.period.as_deref().unwrap_or("Unknown period")
    }

    /// Reject reports that cannot be analyzed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.exceptions.is_empty() {
            return Err(PipelineError::Precondition(
                "'audit_report' must contain 'exceptions' array".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accept any scalar where the model was asked for text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer).map(Option::unwrap_or_default)
}

/// A finding reported by the inference service. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Finding {
    /// The severity label, falling back to `risk_level`.
    pub fn severity_label(&self) -> Option<&str> {
        self.severity.as_deref().or(self.risk_level.as_deref())
    }
}

/// A participant named by the inference service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// The structured analysis of a single batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub trends: String,
}

/// What happened to one batch, reported alongside the merged analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// The batch produced a payload. `batch` is 1-based.
    Succeeded { batch: usize, findings: usize },
    /// The batch was lost; `reason` is the diagnostic message.
    Failed { batch: usize, reason: String },
}

impl BatchStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchStatus::Succeeded { .. })
    }
}

/// The merged analysis of every successful batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub trends: String,
    /// Per-batch status, in submission order.
    #[serde(default)]
    pub batches: Vec<BatchStatus>,
}

impl CombinedAnalysis {
    /// Number of batches that contributed nothing.
    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|b| !b.is_success()).count()
    }

    /// True when at least one batch was lost.
    pub fn is_degraded(&self) -> bool {
        self.failed_batches() > 0
    }
}

/// Counts of items per severity level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
    /// Items with a missing or unrecognised severity.
    pub other: usize,
}

impl SeverityCounts {
    fn record(&mut self, label: Option<&str>) {
        match label.and_then(Severity::from_label) {
            Some(Severity::Low) => self.low += 1,
            Some(Severity::Medium) => self.medium += 1,
            Some(Severity::High) => self.high += 1,
            Some(Severity::Critical) => self.critical += 1,
            None => self.other += 1,
        }
    }

    /// Count the `severity` field of raw exception records.
    pub fn from_exceptions(exceptions: &[ExceptionRecord]) -> Self {
        let mut counts = Self::default();
        for record in exceptions {
            counts.record(record.get("severity").and_then(Value::as_str));
        }
        counts
    }

    /// Count the severity (or risk level) of merged findings.
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            counts.record(finding.severity_label());
        }
        counts
    }

    /// Labelled bars for charting. Low, medium and high are always present.
    pub fn bars(&self) -> Vec<(&'static str, usize)> {
        let mut bars = vec![("low", self.low), ("medium", self.medium), ("high", self.high)];
        if self.critical > 0 {
            bars.push(("critical", self.critical));
        }
        if self.other > 0 {
            bars.push(("other", self.other));
        }
        bars
    }
}

/// Metadata about one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub branch: String,
    pub period: String,
    pub exception_count: usize,
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Everything produced for one audit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: CombinedAnalysis,
    /// Chart name to file path. Empty when chart rendering failed.
    #[serde(default)]
    pub charts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnalysisMetadata>,
}

/// A previously saved analysis: either a full [`AnalysisResponse`] or the
/// bare [`CombinedAnalysis`] taken out of one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SavedAnalysis {
    Response(AnalysisResponse),
    Bare(CombinedAnalysis),
}

impl SavedAnalysis {
    pub fn into_response(self) -> AnalysisResponse {
        match self {
            SavedAnalysis::Response(response) => response,
            SavedAnalysis::Bare(analysis) => AnalysisResponse {
                analysis,
                charts: BTreeMap::new(),
                metadata: None,
            },
        }
    }
}
