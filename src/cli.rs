//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// AuditLens - LLM-powered analysis of banking audit exceptions
///
/// Splits an audit report's exceptions into batches, analyzes them
/// concurrently with a local Ollama model, and writes a merged report.
///
/// Examples:
///   auditlens --input ny01_q1.json
///   auditlens --input ny01_q1.json --batch-size 250 --format json -o analysis.json
///   auditlens --input ny01_q1.json --dry-run
///   auditlens --from-analysis analysis.json -o Audit_Report.md
///   auditlens --init-config
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Audit request JSON file ({"audit_report": {...}})
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["init_config", "from_analysis"],
        conflicts_with = "from_analysis"
    )]
    pub input: Option<PathBuf>,

    /// Render a document from a previously saved analysis instead of
    /// calling the inference service
    #[arg(long, value_name = "FILE")]
    pub from_analysis: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// Defaults to the [general] output setting (audit_report.md)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Ollama model to use for analysis
    #[arg(short, long, env = "AUDITLENS_MODEL")]
    pub model: Option<String>,

    /// Ollama API base URL (requests go to <URL>/generate)
    #[arg(long, value_name = "URL", env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Maximum exception records per batch
    #[arg(long, value_name = "COUNT")]
    pub batch_size: Option<usize>,

    /// Maximum number of batches analyzed at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Per-batch request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Directory for rendered charts
    #[arg(long, value_name = "DIR")]
    pub charts_dir: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .auditlens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 when any batch failed, even if the analysis succeeded
    #[arg(long)]
    pub strict: bool,

    /// Dry run: validate and batch the report without calling the model
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .auditlens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown document (default)
    #[default]
    Markdown,
    /// Full analysis response as JSON
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for path in [&self.input, &self.from_analysis].into_iter().flatten() {
            if !path.is_file() {
                return Err(format!("Input file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general] verbose` from the config file; the
    /// `--quiet` flag wins over both.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
