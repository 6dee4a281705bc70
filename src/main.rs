//! AuditLens - AI-powered audit exception analyzer
//!
//! A CLI tool that splits a branch audit report into batches, analyzes
//! them concurrently with an Ollama model, and writes a merged report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid input, config, every batch failed, etc.)
//!   2 - Some batches failed and --strict was set

mod analysis;
mod cli;
mod config;
mod error;
mod inference;
mod models;
mod report;

use analysis::batcher::split_batches;
use analysis::{AnalysisPipeline, BatchOutcome, DispatchConfig, Dispatcher};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use error::PipelineError;
use indicatif::{ProgressBar, ProgressStyle};
use inference::OllamaClient;
use models::{AnalysisMetadata, AnalysisResponse, AuditReport, AuditRequest, SavedAnalysis};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging starts so `[general] verbose` applies.
    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(args.log_level(config.general.verbose));

    info!("AuditLens v{}", env!("CARGO_PKG_VERSION"));
    log_config_source(&source);
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .auditlens.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!(
        "✅ Created {} with default settings.",
        config::CONFIG_FILE_NAME
    );
    println!("   Edit it to customize the model, batch size, concurrency, and more.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the requested workflow. Returns the exit code.
async fn run(args: Args, mut config: Config) -> Result<i32> {
    config.merge_with_args(&args);
    config.validate()?;

    let output = PathBuf::from(&config.general.output);

    if let Some(ref saved) = args.from_analysis {
        return render_saved_analysis(saved, &output, &args, &config);
    }

    let input = args
        .input
        .as_deref()
        .context("An audit request file is required (--input)")?;
    let report = load_report(input)?;

    if args.dry_run {
        return handle_dry_run(&report, config.pipeline.batch_size);
    }

    run_analysis(report, &output, &args, &config).await
}

/// Analyze a report and write the result.
async fn run_analysis(
    report: AuditReport,
    output: &Path,
    args: &Args,
    config: &Config,
) -> Result<i32> {
    let start_time = Instant::now();
    let batch_count = report.exceptions.len().div_ceil(config.pipeline.batch_size);

    println!(
        "🏦 Analyzing {} exception(s) for {} ({})",
        report.exceptions.len(),
        report.branch_name(),
        report.period_name()
    );
    println!("   Model: {}", config.service.model);
    println!("   Endpoint: {}", config.service.base_url);
    println!(
        "   Batches: {} of up to {} record(s), {} at a time",
        batch_count, config.pipeline.batch_size, config.pipeline.concurrency
    );
    println!("   Timeout: {}s per batch\n", config.service.timeout_seconds);

    let client = OllamaClient::new(config.service.clone())?;
    let mut dispatcher = Dispatcher::new(
        Arc::new(client),
        DispatchConfig {
            concurrency: config.pipeline.concurrency,
            timeout: config.service.timeout(),
        },
    );

    let progress = if args.quiet {
        None
    } else {
        Some(progress_bar(batch_count as u64)?)
    };
    if let Some(ref pb) = progress {
        let pb = pb.clone();
        dispatcher = dispatcher.with_observer(Arc::new(move |_outcome: &BatchOutcome| pb.inc(1)));
    }

    let pipeline = AnalysisPipeline::new(dispatcher).with_batch_size(config.pipeline.batch_size);
    let result = pipeline.analyze(&report).await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let analysis = match result {
        Ok(analysis) => analysis,
        Err(e @ PipelineError::TotalFailure { .. }) => {
            return Err(e).context("No batch could be analyzed - check that Ollama is running");
        }
        Err(e) => return Err(e.into()),
    };

    let charts = if config.report.charts {
        report::render_charts(&report, &analysis, &config.report.charts_path())
    } else {
        Default::default()
    };

    let duration = start_time.elapsed().as_secs_f64();
    let response = AnalysisResponse {
        analysis,
        charts,
        metadata: Some(AnalysisMetadata {
            branch: report.branch_name().to_string(),
            period: report.period_name().to_string(),
            exception_count: report.exceptions.len(),
            model_used: config.service.model.clone(),
            generated_at: Utc::now(),
            duration_seconds: duration,
        }),
    };

    write_output(&response, output, args.format, config)?;

    let analysis = &response.analysis;
    println!("\n📊 Analysis Summary:");
    println!("   Findings: {}", analysis.findings.len());
    println!("   Participants: {}", analysis.participants.len());
    println!(
        "   Batches: {} succeeded, {} failed",
        analysis.batches.len() - analysis.failed_batches(),
        analysis.failed_batches()
    );
    for (name, path) in &response.charts {
        println!("   Chart ({}): {}", name, path);
    }
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Analysis complete! Report saved to: {}", output.display());

    if analysis.is_degraded() {
        warn!(
            "{} batch(es) failed; the report covers only part of the exceptions",
            analysis.failed_batches()
        );
        if args.strict {
            eprintln!(
                "\n⛔ {} batch(es) failed. Failing (exit code 2).",
                analysis.failed_batches()
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Handle --from-analysis: render a document from a saved analysis.
fn render_saved_analysis(saved: &Path, output: &Path, args: &Args, config: &Config) -> Result<i32> {
    info!("Rendering saved analysis from: {}", saved.display());

    let content = std::fs::read_to_string(saved)
        .with_context(|| format!("Failed to read analysis file: {}", saved.display()))?;
    let response = serde_json::from_str::<SavedAnalysis>(&content)
        .with_context(|| format!("Invalid report data in {}", saved.display()))?
        .into_response();

    write_output(&response, output, args.format, config)?;

    println!("✅ Report saved to: {}", output.display());
    Ok(0)
}

/// Handle --dry-run: batch the report and show what would be sent.
fn handle_dry_run(report: &AuditReport, batch_size: usize) -> Result<i32> {
    println!("\n🔍 Dry run: batching exceptions (no model calls)...\n");

    let batches = split_batches(report, batch_size);
    for batch in &batches {
        let prompt = batch
            .render_prompt()
            .context("Failed to prepare analysis prompt")?;
        println!(
            "   📦 Batch {}: {} record(s), {} prompt bytes",
            batch.number(),
            batch.records.len(),
            prompt.len()
        );
    }

    println!(
        "\n   Total: {} exception(s) in {} batch(es)",
        report.exceptions.len(),
        batches.len()
    );
    println!("\n✅ Dry run complete. No model calls were made.");
    Ok(0)
}

fn write_output(
    response: &AnalysisResponse,
    output: &Path,
    format: OutputFormat,
    config: &Config,
) -> Result<()> {
    let content = match format {
        OutputFormat::Json => report::generate_json_report(response)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(response, &config.report, Utc::now())
        }
    };

    std::fs::write(output, &content)
        .with_context(|| format!("Failed to write report to {}", output.display()))
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({eta})")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Read and validate the audit request file.
fn load_report(path: &Path) -> Result<AuditReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read audit request: {}", path.display()))?;

    let request: AuditRequest = serde_json::from_str(&content)
        .map_err(|e| PipelineError::Precondition(format!("Invalid JSON format: {}", e)))?;

    Ok(request.into_report()?)
}

/// Where the configuration came from.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    BuiltIn,
    /// The default file exists but could not be loaded.
    Fallback(anyhow::Error),
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::DefaultFile),
        Ok(None) => (Config::default(), ConfigSource::BuiltIn),
        Err(e) => (Config::default(), ConfigSource::Fallback(e)),
    })
}

fn log_config_source(source: &ConfigSource) {
    match source {
        ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
        ConfigSource::DefaultFile => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME)
        }
        ConfigSource::BuiltIn => debug!("No config file found, using defaults"),
        ConfigSource::Fallback(e) => warn!("Failed to load config: {:#}", e),
    }
}
