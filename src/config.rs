//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.auditlens.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".auditlens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Inference service settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Batching and dispatch settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "audit_report.md".to_string()
}

/// Inference service (Ollama generate API) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API base URL; requests go to `{base_url}/generate`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-batch request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Context window size.
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    /// Worker thread hint for the model runner.
    #[serde(default = "default_num_thread")]
    pub num_thread: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Stop sequences.
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_seconds: default_timeout(),
            num_ctx: default_num_ctx(),
            num_thread: default_num_thread(),
            temperature: default_temperature(),
            stop: default_stop(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_base_url() -> String {
    "http://localhost:11434/api".to_string()
}

fn default_model() -> String {
    "phi3:mini".to_string()
}

fn default_timeout() -> u64 {
    90
}

fn default_num_ctx() -> u32 {
    1024
}

fn default_num_thread() -> u32 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.saturating_sub(1).max(1) as u32
}

fn default_temperature() -> f64 {
    0.3
}

fn default_stop() -> Vec<String> {
    vec!["\n###".to_string(), "\n##".to_string()]
}

/// Batching and dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum exception records per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of batches in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_batch_size() -> usize {
    500
}

fn default_concurrency() -> usize {
    4
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Render charts next to the report.
    #[serde(default = "default_true")]
    pub charts: bool,

    /// Directory for chart files. Defaults to `<tmp>/audit_charts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charts_dir: Option<PathBuf>,

    /// Include the participants table in the document.
    #[serde(default = "default_true")]
    pub include_participants: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            charts: true,
            charts_dir: None,
            include_participants: true,
        }
    }
}

impl ReportConfig {
    /// The directory charts are written to.
    pub fn charts_path(&self) -> PathBuf {
        self.charts_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("audit_charts"))
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line (or through their
    /// environment variables) override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.service.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.service.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(temperature) = args.temperature {
            self.service.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.service.timeout_seconds = timeout;
        }

        if let Some(batch_size) = args.batch_size {
            self.pipeline.batch_size = batch_size;
        }
        if let Some(concurrency) = args.concurrency {
            self.pipeline.concurrency = concurrency;
        }

        if let Some(ref dir) = args.charts_dir {
            self.report.charts_dir = Some(dir.clone());
        }
        if args.no_charts {
            self.report.charts = false;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            anyhow::bail!("pipeline.batch_size must be at least 1");
        }
        if self.pipeline.concurrency == 0 {
            anyhow::bail!("pipeline.concurrency must be at least 1");
        }
        if self.service.timeout_seconds == 0 {
            anyhow::bail!("service.timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
