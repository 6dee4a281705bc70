//! Ollama `/generate` client.

use crate::config::ServiceConfig;
use crate::error::BatchError;
use crate::inference::InferenceClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Ollama generate API request.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions<'a> {
    num_ctx: u32,
    num_thread: u32,
    temperature: f64,
    stop: &'a [String],
}

/// Ollama generate API response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[allow(dead_code)] // Response field, always true for non-streaming calls
    #[serde(default)]
    done: bool,
}

/// Client for a single Ollama endpoint.
pub struct OllamaClient {
    config: ServiceConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        info!(
            "Initializing inference client with model {} at {}",
            config.model, config.base_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                num_ctx: self.config.num_ctx,
                num_thread: self.config.num_thread,
                temperature: self.config.temperature,
                stop: &self.config.stop,
            },
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, BatchError> {
        let url = self.endpoint();
        debug!("Sending generate request ({} prompt bytes)", prompt.len());

        let response = self
            .http_client
            .post(&url)
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BatchError::Timeout(self.config.timeout())
                } else if e.is_connect() {
                    BatchError::Transport(format!(
                        "cannot connect to Ollama at {}",
                        self.config.base_url
                    ))
                } else {
                    BatchError::Transport(format!("failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BatchError::Status { status, body });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BatchError::Timeout(self.config.timeout())
            } else {
                BatchError::Transport(format!("failed to read response body: {}", e))
            }
        })?;

        let generated: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| BatchError::Transport(format!("malformed response body: {}", e)))?;

        Ok(generated.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OllamaClient {
        OllamaClient::new(ServiceConfig {
            base_url: format!("{}/api", server.uri()),
            num_thread: 3,
            ..ServiceConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_format() {
        let client = OllamaClient::new(ServiceConfig::default()).unwrap();
        let body = serde_json::to_value(client.build_request("Analyze")).unwrap();

        assert_eq!(body["model"], "phi3:mini");
        assert_eq!(body["prompt"], "Analyze");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["options"]["num_ctx"], 1024);
        assert_eq!(body["options"]["temperature"], json!(0.3));
        assert_eq!(body["options"]["stop"], json!(["\n###", "\n##"]));
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");
    }

    #[tokio::test]
    async fn test_generate_returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "stream": false,
                "format": "json",
                "options": {"num_thread": 3}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "phi3:mini",
                "response": "{\"summary\": \"A\"}",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = tokio_test::assert_ok!(client_for(&server).generate("prompt").await);
        assert_eq!(text, "{\"summary\": \"A\"}");
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("prompt").await.unwrap_err();
        match err {
            BatchError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("prompt").await.unwrap_err();
        assert!(matches!(err, BatchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = OllamaClient::new(ServiceConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            ..ServiceConfig::default()
        })
        .unwrap();

        let err = client.generate("prompt").await.unwrap_err();
        assert!(matches!(err, BatchError::Transport(_)));
    }
}
