//! The batch analysis pipeline.
//!
//! `Validating -> Batching -> Dispatching -> Aggregating -> Done`. Each stage
//! starts only after the previous one has finished; dispatching waits for
//! every batch before aggregation begins.

use crate::analysis::aggregator::aggregate;
use crate::analysis::batcher::{split_batches, DEFAULT_BATCH_SIZE};
use crate::analysis::dispatcher::Dispatcher;
use crate::error::PipelineError;
use crate::models::{AuditReport, CombinedAnalysis};
use std::fmt;
use tracing::{debug, info};

/// Pipeline stage, used for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Batching,
    Dispatching,
    Aggregating,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Batching => "batching",
            Stage::Dispatching => "dispatching",
            Stage::Aggregating => "aggregating",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs one audit report through batching, dispatch and aggregation.
pub struct AnalysisPipeline {
    dispatcher: Dispatcher,
    batch_size: usize,
}

impl AnalysisPipeline {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        self.batch_size = batch_size;
        self
    }

    /// Render the prompts a report would be split into, without sending them.
    pub fn prepare(&self, report: &AuditReport) -> Result<Vec<String>, PipelineError> {
        enter(Stage::Validating);
        report.validate()?;

        enter(Stage::Batching);
        let batches = split_batches(report, self.batch_size);
        batches
            .iter()
            .map(|batch| {
                batch.render_prompt().map_err(|e| {
                    PipelineError::Precondition(format!(
                        "Failed to prepare analysis prompt: {}",
                        e
                    ))
                })
            })
            .collect()
    }

    /// Analyze a report end to end.
    pub async fn analyze(&self, report: &AuditReport) -> Result<CombinedAnalysis, PipelineError> {
        let prompts = self.prepare(report)?;
        info!(
            "Analyzing {} exception(s) for {} ({}) in {} batch(es)",
            report.exceptions.len(),
            report.branch_name(),
            report.period_name(),
            prompts.len()
        );

        enter(Stage::Dispatching);
        let outcomes = self.dispatcher.dispatch(prompts).await;

        enter(Stage::Aggregating);
        let analysis = aggregate(outcomes)?;

        enter(Stage::Done);
        Ok(analysis)
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Pipeline stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dispatcher::DispatchConfig;
    use crate::config::ServiceConfig;
    use crate::error::BatchError;
    use crate::inference::{InferenceClient, OllamaClient};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingClient {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl InferenceClient for CountingClient {
        async fn generate(&self, _prompt: &str) -> Result<String, BatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BatchError::Transport("connection refused".to_string()))
            } else {
                Ok(r#"{"summary": "ok", "findings": [], "participants": [], "trends": ""}"#.to_string())
            }
        }
    }

    fn counting(fail: bool) -> Arc<CountingClient> {
        Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_empty_report_is_rejected_before_dispatch() {
        let client = counting(false);
        let pipeline = AnalysisPipeline::new(Dispatcher::new(
            client.clone(),
            DispatchConfig::default(),
        ));

        let report = AuditReport::new("NY-01", "Q1-2024", vec![]);
        let result = pipeline.analyze(&report).await;

        assert!(matches!(result, Err(PipelineError::Precondition(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_batches_failing_is_total_failure() {
        let client = counting(true);
        let pipeline = AnalysisPipeline::new(Dispatcher::new(
            client.clone(),
            DispatchConfig::default(),
        ))
        .with_batch_size(2);

        let exceptions = (0..5).map(|id| json!({"id": id})).collect();
        let report = AuditReport::new("NY-01", "Q1-2024", exceptions);
        let result = pipeline.analyze(&report).await;

        assert!(matches!(
            result,
            Err(PipelineError::TotalFailure { batches: 3, .. })
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_prepare_renders_one_prompt_per_batch() {
        let pipeline = AnalysisPipeline::new(Dispatcher::new(
            counting(false),
            DispatchConfig::default(),
        ))
        .with_batch_size(2);

        let exceptions = (0..3).map(|id| json!({"id": id})).collect();
        let prompts = pipeline
            .prepare(&AuditReport::new("NY-01", "Q1-2024", exceptions))
            .unwrap();

        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Batch 1 of 2:"));
        assert!(prompts[1].contains("Batch 2 of 2:"));
    }

    fn generate_reply(payload: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "model": "phi3:mini",
            "response": payload.to_string(),
            "done": true
        }))
    }

    #[tokio::test]
    async fn test_end_to_end_against_mock_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string_contains("Batch 1 of 2"))
            .respond_with(generate_reply(json!({
                "summary": "A",
                "findings": [{"title": "F1"}],
                "participants": [],
                "trends": "T1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string_contains("Batch 2 of 2"))
            .respond_with(generate_reply(json!({
                "summary": "B",
                "findings": [{"title": "F2"}],
                "participants": [],
                "trends": "T2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new(ServiceConfig {
            base_url: format!("{}/api", server.uri()),
            ..ServiceConfig::default()
        })
        .unwrap();
        let pipeline = AnalysisPipeline::new(Dispatcher::new(
            Arc::new(client),
            DispatchConfig::default(),
        ))
        .with_batch_size(1);

        let report = AuditReport::new(
            "NY-01",
            "Q1-2024",
            vec![
                json!({"id": 1, "severity": "high"}),
                json!({"id": 2, "severity": "low"}),
            ],
        );
        let analysis = pipeline.analyze(&report).await.unwrap();

        assert_eq!(analysis.summary, "A B");
        assert_eq!(analysis.trends, "T1 T2");
        let titles: Vec<_> = analysis
            .findings
            .iter()
            .filter_map(|f| f.title.as_deref())
            .collect();
        assert_eq!(titles, vec!["F1", "F2"]);
        assert!(analysis.participants.is_empty());
        assert!(!analysis.is_degraded());
    }

    #[tokio::test]
    async fn test_unparseable_batch_degrades_analysis() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string_contains("Batch 2 of 3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "I cannot comply", "done": true})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(generate_reply(json!({
                "summary": "S",
                "findings": [{"title": "F"}],
                "trends": "T"
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(ServiceConfig {
            base_url: format!("{}/api", server.uri()),
            ..ServiceConfig::default()
        })
        .unwrap();
        let pipeline = AnalysisPipeline::new(Dispatcher::new(
            Arc::new(client),
            DispatchConfig::default(),
        ))
        .with_batch_size(1);

        let exceptions = (0..3).map(|id| json!({"id": id})).collect();
        let analysis = pipeline
            .analyze(&AuditReport::new("NY-01", "Q1-2024", exceptions))
            .await
            .unwrap();

        assert_eq!(analysis.findings.len(), 2);
        assert_eq!(analysis.summary, "S S");
        assert_eq!(analysis.failed_batches(), 1);
        assert!(!analysis.batches[1].is_success());
    }
}
