use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use minutewise_core::extraction::domain::understanding_service::UnderstandingService;
use minutewise_core::extraction::infrastructure::openai_chat_service::OpenAiChatService;
use minutewise_core::pipeline::extract_action_items_use_case::{
    ExtractActionItemsUseCase, ExtractionReport,
};
use minutewise_core::pipeline::infrastructure::threaded_map_executor::ThreadedMapExecutor;
use minutewise_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use minutewise_core::shared::config::PipelineConfig;
use minutewise_core::validation::domain::validation_result::ValidationStatus;

/// Extract deduplicated, confidence-scored action items from a meeting transcript.
#[derive(Parser)]
#[command(name = "minutewise")]
struct Cli {
    /// Transcript file with `Speaker: utterance` lines.
    input: PathBuf,

    /// Write the JSON report here instead of stdout.
    output: Option<PathBuf>,

    /// JSON config file (defaults to the per-user config when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Flag items scoring below this confidence (0.0-1.0).
    #[arg(long)]
    confidence_threshold: Option<f64>,

    /// Minimum task similarity for candidates to merge (0.0-1.0).
    #[arg(long)]
    similarity_threshold: Option<f64>,

    /// Maximum new speaker turns per chunk.
    #[arg(long)]
    max_turns: Option<usize>,

    /// Turns repeated from the previous chunk.
    #[arg(long)]
    overlap: Option<usize>,

    /// Extraction calls in flight at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Chat model name (overrides OPENAI_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible API base URL (overrides OPENAI_BASE_URL).
    #[arg(long)]
    base_url: Option<String>,

    /// Leave flagged items out of the report.
    #[arg(long)]
    accepted_only: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = load_config(&cli)?;
    let service = build_service(&cli)?;
    let transcript = fs::read_to_string(&cli.input)
        .map_err(|e| format!("Failed to read {}: {e}", cli.input.display()))?;

    let progress: Box<dyn Fn(usize, usize) -> bool + Send + Sync> = Box::new(|current, total| {
        eprint!("\rExtracting chunk {current}/{total}");
        true
    });

    let mut use_case = ExtractActionItemsUseCase::new(
        service,
        Box::new(ThreadedMapExecutor::new()),
        config,
        Box::new(StdoutPipelineLogger::default()),
        Some(progress),
        None,
    );
    let source = cli.input.display().to_string();
    let result = use_case.run(&transcript, &source);
    eprintln!();
    let mut report = result?;

    if cli.accepted_only {
        report.items.retain(|r| r.status == ValidationStatus::Accepted);
    }
    log_outcome(&report);
    write_report(&report, cli.output.as_deref())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => match PipelineConfig::default_path().filter(|p| p.exists()) {
            Some(path) => {
                log::info!("Using config {}", path.display());
                PipelineConfig::load(&path)?
            }
            None => PipelineConfig::default(),
        },
    };

    if let Some(t) = cli.confidence_threshold {
        config.validation.confidence_threshold = t;
    }
    if let Some(t) = cli.similarity_threshold {
        config.aggregation.similarity_threshold = t;
    }
    if let Some(n) = cli.max_turns {
        config.chunking.max_turns = n;
    }
    if let Some(n) = cli.overlap {
        config.chunking.overlap_turns = n;
    }
    if let Some(n) = cli.concurrency {
        config.max_concurrent_extractions = n;
    }
    config.validate()?;
    Ok(config)
}

fn build_service(cli: &Cli) -> Result<Arc<dyn UnderstandingService>, Box<dyn std::error::Error>> {
    let mut service = OpenAiChatService::from_env()
        .ok_or("OPENAI_API_KEY is not set")??;
    if let Some(model) = &cli.model {
        service = service.with_model(model);
    }
    if let Some(url) = &cli.base_url {
        service = service.with_base_url(url);
    }
    log::info!("Extracting with model {}", service.model());
    Ok(Arc::new(service))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if let Some(path) = &cli.config {
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()).into());
        }
    }
    if let Some(model) = &cli.model {
        if model.trim().is_empty() {
            return Err("Model name must not be empty".into());
        }
    }
    Ok(())
}

fn log_outcome(report: &ExtractionReport) {
    log::info!(
        "{} accepted, {} flagged, {} discarded from {} candidate(s) in {} chunk(s)",
        report.accepted().count(),
        report.flagged().count(),
        report.discards.count,
        report.candidate_count,
        report.chunk_count
    );
    for warning in &report.warnings {
        log::warn!("Chunk {}: {}", warning.chunk_index, warning.message);
    }
}

fn write_report(
    report: &ExtractionReport,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            log::info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
