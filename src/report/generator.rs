//! Markdown and JSON report generation.
//!
//! This module renders a combined analysis into the audit exception
//! document, or serializes the full analysis response as JSON.

use crate::config::ReportConfig;
use crate::models::{AnalysisMetadata, AnalysisResponse, BatchStatus, CombinedAnalysis, Finding};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Generate the complete Markdown document.
pub fn generate_markdown_report(
    response: &AnalysisResponse,
    options: &ReportConfig,
    generated_at: DateTime<Utc>,
) -> String {
    let analysis = &response.analysis;
    let mut output = String::new();

    output.push_str("# Banking Audit Exception Report\n\n");
    output.push_str(&format!(
        "Generated: {}\n\n",
        generated_at.format("%Y-%m-%d %H:%M")
    ));

    if let Some(ref metadata) = response.metadata {
        output.push_str(&generate_metadata_section(metadata, analysis));
    }

    output.push_str(&generate_summary_section(analysis));
    output.push_str(&generate_findings_section(&analysis.findings));

    if options.include_participants {
        output.push_str(&generate_participants_section(analysis));
    }

    output.push_str(&generate_trends_section(&analysis.trends));
    output.push_str(&generate_charts_section(&response.charts));
    output.push_str(&generate_batch_section(&analysis.batches));

    output.push_str("---\n\n");
    output.push_str("*Report generated by AuditLens*\n");

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &AnalysisMetadata, analysis: &CombinedAnalysis) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Branch:** {}\n", metadata.branch));
    section.push_str(&format!("- **Period:** {}\n", metadata.period));
    section.push_str(&format!(
        "- **Exceptions Analyzed:** {}\n",
        metadata.exception_count
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    if analysis.is_degraded() {
        section.push_str(&format!(
            "- **Batches Failed:** {} of {}\n",
            analysis.failed_batches(),
            analysis.batches.len()
        ));
    }
    section.push('\n');

    section
}

fn generate_summary_section(analysis: &CombinedAnalysis) -> String {
    let summary = if analysis.summary.trim().is_empty() {
        "No summary provided"
    } else {
        analysis.summary.as_str()
    };
    format!("## Executive Summary\n\n{}\n\n", summary)
}

/// Generate the findings section.
fn generate_findings_section(findings: &[Finding]) -> String {
    let mut section = String::new();

    section.push_str("## Detailed Findings\n\n");

    if findings.is_empty() {
        section.push_str("No findings were reported.\n\n");
        return section;
    }

    for finding in findings {
        section.push_str(&generate_finding_block(finding));
    }

    section
}

/// Generate a single finding block.
fn generate_finding_block(finding: &Finding) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {}\n\n",
        finding.title.as_deref().unwrap_or("Untitled Finding")
    ));
    block.push_str(&format!(
        "{}\n\n",
        finding.description.as_deref().unwrap_or("No description")
    ));
    block.push_str(&format!(
        "**Severity:** {}\n\n",
        finding.severity_label().unwrap_or("unknown").to_uppercase()
    ));
    if let Some(ref impact) = finding.impact {
        block.push_str(&format!("**Impact:** {}\n\n", impact));
    }
    block.push_str(&format!(
        "**Recommendation:** {}\n\n",
        finding.recommendation.as_deref().unwrap_or("None")
    ));

    block
}

/// Generate the participants table.
fn generate_participants_section(analysis: &CombinedAnalysis) -> String {
    let mut section = String::new();

    section.push_str("## Participants Involved\n\n");

    if analysis.participants.is_empty() {
        section.push_str("No participants identified.\n\n");
        return section;
    }

    section.push_str("| Name | Role | Branch |\n");
    section.push_str("|:---|:---|:---|\n");
    for participant in &analysis.participants {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            table_cell(participant.name.as_deref()),
            table_cell(participant.role.as_deref()),
            table_cell(participant.branch.as_deref()),
        ));
    }
    section.push('\n');

    section
}

fn table_cell(value: Option<&str>) -> String {
    value.unwrap_or("").replace('|', "\\|").replace('\n', " ")
}

fn generate_trends_section(trends: &str) -> String {
    if trends.trim().is_empty() {
        return String::new();
    }
    format!("## Trends\n\n{}\n\n", trends)
}

/// Link rendered charts.
fn generate_charts_section(charts: &BTreeMap<String, String>) -> String {
    if charts.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Charts\n\n");
    for (name, path) in charts {
        section.push_str(&format!("![{}]({})\n\n", name, path));
    }
    section
}

/// List lost batches so readers know the analysis is partial.
fn generate_batch_section(batches: &[BatchStatus]) -> String {
    let failed: Vec<_> = batches
        .iter()
        .filter_map(|status| match status {
            BatchStatus::Failed { batch, reason } => Some((batch, reason)),
            BatchStatus::Succeeded { .. } => None,
        })
        .collect();

    if failed.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Incomplete Analysis\n\n");
    section.push_str(&format!(
        "{} of {} batch(es) could not be analyzed; their exceptions are not covered above.\n\n",
        failed.len(),
        batches.len()
    ));
    for (batch, reason) in failed {
        section.push_str(&format!("- Batch {}: {}\n", batch, reason));
    }
    section.push('\n');

    section
}

/// Generate a JSON report.
pub fn generate_json_report(response: &AnalysisResponse) -> Result<String> {
    serde_json::to_string_pretty(response).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Participant;
    use chrono::TimeZone;

    fn create_test_response() -> AnalysisResponse {
        AnalysisResponse {
            analysis: CombinedAnalysis {
                summary: "Cash handling exceptions concentrated in the teller line.".to_string(),
                findings: vec![Finding {
                    title: Some("Vault limit exceeded".to_string()),
                    description: Some("Vault cash exceeded policy limit on 4 days".to_string()),
                    risk_level: Some("high".to_string()),
                    impact: Some("Insurance coverage gap".to_string()),
                    ..Finding::default()
                }],
                participants: vec![Participant {
                    name: Some("J. Doe".to_string()),
                    role: Some("Head Teller".to_string()),
                    branch: Some("NY-01".to_string()),
                }],
                trends: "Exceptions rise at quarter end.".to_string(),
                batches: vec![
                    BatchStatus::Succeeded {
                        batch: 1,
                        findings: 1,
                    },
                    BatchStatus::Failed {
                        batch: 2,
                        reason: "request timed out after 90s".to_string(),
                    },
                ],
            },
            charts: [("severity".to_string(), "/tmp/audit_charts/severity.svg".to_string())]
                .into_iter()
                .collect(),
            metadata: Some(AnalysisMetadata {
                branch: "NY-01".to_string(),
                period: "Q1-2024".to_string(),
                exception_count: 700,
                model_used: "phi3:mini".to_string(),
                generated_at: Utc::now(),
                duration_seconds: 42.0,
            }),
        }
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_generate_markdown_report() {
        let response = create_test_response();
        let markdown =
            generate_markdown_report(&response, &ReportConfig::default(), generated_at());

        assert!(markdown.starts_with("# Banking Audit Exception Report"));
        assert!(markdown.contains("Generated: 2024-04-02 09:30"));
        assert!(markdown.contains("## Executive Summary"));
        assert!(markdown.contains("### Vault limit exceeded"));
        assert!(markdown.contains("**Severity:** HIGH"));
        assert!(markdown.contains("**Recommendation:** None"));
        assert!(markdown.contains("| J. Doe | Head Teller | NY-01 |"));
        assert!(markdown.contains("## Trends"));
        assert!(markdown.contains("![severity](/tmp/audit_charts/severity.svg)"));
        assert!(markdown.contains("- **Batches Failed:** 1 of 2"));
        assert!(markdown.contains("- Batch 2: request timed out after 90s"));
    }

    #[test]
    fn test_finding_defaults() {
        let block = generate_finding_block(&Finding::default());

        assert!(block.contains("### Untitled Finding"));
        assert!(block.contains("No description"));
        assert!(block.contains("**Severity:** UNKNOWN"));
        assert!(!block.contains("**Impact:**"));
    }

    #[test]
    fn test_participants_can_be_omitted() {
        let response = create_test_response();
        let options = ReportConfig {
            include_participants: false,
            ..ReportConfig::default()
        };
        let markdown = generate_markdown_report(&response, &options, generated_at());
        assert!(!markdown.contains("## Participants Involved"));
    }

    #[test]
    fn test_bare_analysis_renders_without_metadata() {
        let response: AnalysisResponse =
            serde_json::from_str(r#"{"analysis": {"summary": "", "findings": []}}"#).unwrap();
        let markdown =
            generate_markdown_report(&response, &ReportConfig::default(), generated_at());

        assert!(!markdown.contains("## Metadata"));
        assert!(markdown.contains("No summary provided"));
        assert!(markdown.contains("No findings were reported."));
        assert!(!markdown.contains("## Incomplete Analysis"));
    }

    #[test]
    fn test_table_cell_escapes_pipes() {
        assert_eq!(table_cell(Some("Ops | Cash")), "Ops \\| Cash");
        assert_eq!(table_cell(None), "");
    }

    #[test]
    fn test_generate_json_report() {
        let response = create_test_response();
        let json = generate_json_report(&response).unwrap();

        assert!(json.contains("\"analysis\""));
        assert!(json.contains("\"charts\""));
        assert!(json.contains("\"exception_count\": 700"));
        assert!(json.contains("\"status\": \"failed\""));
    }
}
