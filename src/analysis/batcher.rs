//! Splitting an audit report into bounded batches and rendering prompts.

use crate::models::{AuditReport, ExceptionRecord};

/// Default number of exception records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// A contiguous slice of the report's exceptions with its context.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// 0-based position in submission order.
    pub index: usize,
    /// Total number of batches for the report.
    pub total: usize,
    pub branch: &'a str,
    pub period: &'a str,
    pub records: &'a [ExceptionRecord],
}

impl Batch<'_> {
    /// 1-based batch number, as shown to the model and in reports.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// Render the instruction payload for the inference service.
    pub fn render_prompt(&self) -> Result<String, serde_json::Error> {
        let records = serde_json::to_string_pretty(self.records)?;

        Ok(format!(
            "You are an expert banking auditor analyzing exceptions from {branch} branch for {period}.\n\
             Batch {number} of {total}:\n\
             Provide:\n\
             1. Executive summary\n\
             2. Findings (title, description, risk_level, impact)\n\
             3. Recommendations\n\
             \n\
             Respond with a single JSON object of this shape:\n\
             {shape}\n\
             \n\
             Exceptions:\n\
             {records}",
            branch = self.branch,
            period = self.period,
            number = self.number(),
            total = self.total,
            shape = RESPONSE_SHAPE,
        ))
    }
}

/// Split the report's exceptions into contiguous batches of at most
/// `batch_size` records, preserving order.
///
/// # Panics
///
/// Panics if `batch_size` is zero.
pub fn split_batches(report: &AuditReport, batch_size: usize) -> Vec<Batch<'_>> {
    assert!(batch_size > 0, "batch_size must be positive");

    let total = report.exceptions.len().div_ceil(batch_size);
    let branch = report.branch_name();
    let period = report.period_name();

    report
        .exceptions
        .chunks(batch_size)
        .enumerate()
        .map(|(index, records)| Batch {
            index,
            total,
            branch,
            period,
            records,
        })
        .collect()
}

const RESPONSE_SHAPE: &str = r#"{"summary": "...", "findings": [{"title": "...", "description": "...", "risk_level": "low|medium|high", "impact": "...", "recommendation": "..."}], "participants": [{"name": "...", "role": "...", "branch": "..."}], "trends": "..."}"#;
