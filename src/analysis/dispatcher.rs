//! Concurrent dispatch of batch prompts to the inference service.
//!
//! Every prompt runs in its own task. A semaphore caps how many calls are
//! in flight, and each call gets its own timeout. Failures are captured per
//! batch and never cancel siblings. Dropping a pending dispatch aborts every
//! call still running.

use crate::error::BatchError;
use crate::inference::InferenceClient;
use crate::models::BatchPayload;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default maximum number of concurrent calls.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// The result of one batch: a payload or a failure marker.
pub type BatchResult = Result<BatchPayload, BatchError>;

/// A batch result tagged with the batch it belongs to.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// 0-based batch position in submission order.
    pub index: usize,
    pub result: BatchResult,
}

/// Callback invoked as each batch completes, in completion order.
pub type CompletionObserver = Arc<dyn Fn(&BatchOutcome) + Send + Sync>;

/// Dispatch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Fans prompts out to an [`InferenceClient`] and gathers the outcomes.
pub struct Dispatcher {
    client: Arc<dyn InferenceClient>,
    config: DispatchConfig,
    observer: Option<CompletionObserver>,
}

impl Dispatcher {
    /// # Panics
    ///
    /// Panics if `config.concurrency` is zero.
    pub fn new(client: Arc<dyn InferenceClient>, config: DispatchConfig) -> Self {
        assert!(config.concurrency > 0, "concurrency must be positive");
        Self {
            client,
            config,
            observer: None,
        }
    }

    /// Register a callback run after each batch finishes.
    pub fn with_observer(mut self, observer: CompletionObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Send every prompt exactly once and wait for all of them.
    ///
    /// Outcomes are returned in submission order, one per prompt.
    pub async fn dispatch(&self, prompts: Vec<String>) -> Vec<BatchOutcome> {
        info!(
            "Dispatching {} batch(es), up to {} at a time",
            prompts.len(),
            self.config.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let timeout = self.config.timeout;

        let total = prompts.len();
        let mut join_set = JoinSet::new();
        for (index, prompt) in prompts.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let observer = self.observer.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                debug!(batch = index + 1, "Batch started");

                let result = call_with_timeout(client.as_ref(), &prompt, timeout).await;
                let outcome = BatchOutcome { index, result };

                match &outcome.result {
                    Ok(payload) => debug!(
                        batch = index + 1,
                        findings = payload.findings.len(),
                        "Batch completed"
                    ),
                    Err(e) => warn!(batch = index + 1, "Batch failed: {}", e),
                }

                if let Some(observer) = observer {
                    observer(&outcome);
                }
                outcome
            });
        }

        // Dropping the set aborts unfinished calls if the caller gives up.
        let mut slots: Vec<Option<BatchOutcome>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => {
                    let index = outcome.index;
                    slots[index] = Some(outcome);
                }
                Err(e) => warn!("Batch task join error: {}", e),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| BatchOutcome {
                    index,
                    result: Err(BatchError::Transport("batch task aborted".to_string())),
                })
            })
            .collect()
    }
}

async fn call_with_timeout(
    client: &dyn InferenceClient,
    prompt: &str,
    timeout: Duration,
) -> BatchResult {
    match tokio::time::timeout(timeout, client.generate(prompt)).await {
        Ok(Ok(text)) => parse_payload(&text),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(BatchError::Timeout(timeout)),
    }
}

/// Parse the model's text answer into a batch payload.
///
/// The answer must be a single JSON object; missing keys default to empty.
pub fn parse_payload(text: &str) -> BatchResult {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| BatchError::Parse(e.to_string()))?;

    if !value.is_object() {
        return Err(BatchError::Parse(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }

    serde_json::from_value(value).map_err(|e| BatchError::Parse(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
