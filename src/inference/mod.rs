//! Inference service access.
//!
//! The pipeline talks to the model through [`InferenceClient`], so the
//! dispatcher can be driven by the real Ollama client or a test stub.

pub mod ollama;

pub use ollama::OllamaClient;

use crate::error::BatchError;
use async_trait::async_trait;

/// A service that turns a prompt into the model's raw text answer.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send one prompt and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, BatchError>;
}
