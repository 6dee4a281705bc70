//! Merging batch outcomes into one combined analysis.
//!
//! Outcomes are merged in batch order regardless of the order they
//! arrive in, so the same inputs always produce the same analysis.

use crate::analysis::dispatcher::BatchOutcome;
use crate::error::PipelineError;
use crate::models::{BatchStatus, CombinedAnalysis};
use tracing::{info, warn};

/// Merge every batch outcome into a [`CombinedAnalysis`].
///
/// Failed batches contribute nothing but are listed in `batches`.
/// Returns [`PipelineError::TotalFailure`] when no batch succeeded.
pub fn aggregate(mut outcomes: Vec<BatchOutcome>) -> Result<CombinedAnalysis, PipelineError> {
    outcomes.sort_by_key(|o| o.index);

    let mut combined = CombinedAnalysis::default();
    let mut summaries = Vec::new();
    let mut trends = Vec::new();
    let mut first_error = None;

    for outcome in outcomes {
        let batch = outcome.index + 1;
        match outcome.result {
            Ok(payload) => {
                combined.batches.push(BatchStatus::Succeeded {
                    batch,
                    findings: payload.findings.len(),
                });
                summaries.push(payload.summary);
                trends.push(payload.trends);
                combined.findings.extend(payload.findings);
                combined.participants.extend(payload.participants);
            }
            Err(e) => {
                let reason = e.to_string();
                first_error.get_or_insert_with(|| reason.clone());
                combined.batches.push(BatchStatus::Failed { batch, reason });
            }
        }
    }

    let failed = combined.failed_batches();
    if failed == combined.batches.len() {
        return Err(PipelineError::TotalFailure {
            batches: failed,
            first_error: first_error.unwrap_or_else(|| "no batches were dispatched".to_string()),
        });
    }

    if failed > 0 {
        warn!(
            "{} of {} batch(es) failed; analysis is partial",
            failed,
            combined.batches.len()
        );
    }

    combined.summary = join_text(&summaries);
    combined.trends = join_text(&trends);

    info!(
        "Merged {} batch(es): {} finding(s), {} participant(s)",
        combined.batches.len() - failed,
        combined.findings.len(),
        combined.participants.len()
    );

    Ok(combined)
}

/// Join fragments with a single space, skipping blank ones. Kept
/// fragments are not altered.
fn join_text(parts: &[String]) -> String {
    parts
        .iter()
        .map(String::as_str)
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
