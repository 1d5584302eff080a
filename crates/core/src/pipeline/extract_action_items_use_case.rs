use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use super::map_executor::{MapConfig, MapExecutor};
use super::pipeline_logger::PipelineLogger;
use crate::consolidation::domain::aggregator::Aggregator;
use crate::consolidation::domain::confidence_scorer::ConfidenceScorer;
use crate::extraction::domain::extractor_adapter::{ChunkWarning, ExtractionError, ExtractorAdapter};
use crate::extraction::domain::understanding_service::UnderstandingService;
use crate::shared::config::{ConfigError, PipelineConfig};
use crate::transcript::domain::chunker::{Chunker, FormatError};
use crate::validation::domain::validation_result::{
    ValidationReason, ValidationResult, ValidationStatus,
};
use crate::validation::domain::validator::{DiscardEntry, DiscardLog, DiscardSummary, Validator};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("malformed transcript: {0}")]
    Format(#[from] FormatError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Everything a caller needs to trust, review or audit one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub source: String,
    pub chunk_count: usize,
    pub candidate_count: usize,
    /// Accepted and flagged items, in order of first appearance.
    pub items: Vec<ValidationResult>,
    pub discards: DiscardSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discarded: Vec<DiscardEntry>,
    pub warnings: Vec<ChunkWarning>,
}

impl ExtractionReport {
    pub fn accepted(&self) -> impl Iterator<Item = &ValidationResult> {
        self.items
            .iter()
            .filter(|r| r.status == ValidationStatus::Accepted)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &ValidationResult> {
        self.items
            .iter()
            .filter(|r| r.status == ValidationStatus::Flagged)
    }
}

type SharedLogger = Arc<Mutex<Box<dyn PipelineLogger>>>;
type ProgressCallback = Arc<dyn Fn(usize, usize) -> bool + Send + Sync>;

/// Orchestrates chunking, concurrent extraction (MAP), and consolidation,
/// scoring and validation (REDUCE).
///
/// REDUCE starts only once the executor has returned an outcome for every
/// chunk. A fatal extraction error ends the run before REDUCE.
///
/// Each `run` gets its own cancel flag, so a failed run never poisons the
/// next one. The caller's flag is read when a run starts and after every
/// finished chunk.
pub struct ExtractActionItemsUseCase {
    adapter: Arc<ExtractorAdapter>,
    executor: Box<dyn MapExecutor>,
    config: PipelineConfig,
    logger: SharedLogger,
    on_progress: Option<ProgressCallback>,
    cancelled: Arc<AtomicBool>,
}

impl ExtractActionItemsUseCase {
    pub fn new(
        service: Arc<dyn UnderstandingService>,
        executor: Box<dyn MapExecutor>,
        config: PipelineConfig,
        logger: Box<dyn PipelineLogger>,
        on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send + Sync>>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            adapter: Arc::new(ExtractorAdapter::new(service)),
            executor,
            config,
            logger: Arc::new(Mutex::new(logger)),
            on_progress: on_progress.map(Arc::from),
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn run(&mut self, transcript: &str, source: &str) -> Result<ExtractionReport, PipelineError> {
        self.config.validate()?;

        // 1. Chunk
        let started = Instant::now();
        let chunks = Chunker::chunk(transcript, &self.config.chunking)?;
        let chunk_count = chunks.len();
        with_logger(&self.logger, |l| {
            l.timing("chunk", elapsed_ms(started));
            l.metric("chunks", chunk_count as f64);
            l.info(&format!("Split {source} into {chunk_count} chunk(s)"));
        });

        // 2. MAP: extract every chunk, bounded by the concurrency limit
        let started = Instant::now();
        let run_cancelled = Arc::new(AtomicBool::new(self.cancelled.load(Ordering::Relaxed)));
        let on_progress = self.progress_callback();
        let outcomes = self.executor.execute(
            self.adapter.clone(),
            chunks,
            MapConfig {
                concurrency: self.config.max_concurrent_extractions,
                extraction: self.config.extraction.clone(),
                on_progress: Some(on_progress),
                cancelled: run_cancelled,
            },
        );
        let outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(e) => {
                with_logger(&self.logger, |l| l.warn(&format!("Run aborted: {e}")));
                return Err(e.into());
            }
        };

        let mut candidates = Vec::new();
        let mut warnings = Vec::new();
        for outcome in outcomes {
            if let Some(warning) = outcome.warning() {
                with_logger(&self.logger, |l| {
                    l.warn(&format!(
                        "Chunk {} produced no usable output: {}",
                        warning.chunk_index, warning.message
                    ))
                });
                warnings.push(warning.clone());
            }
            candidates.extend_from_slice(outcome.candidates());
        }
        let candidate_count = candidates.len();
        with_logger(&self.logger, |l| {
            l.timing("map", elapsed_ms(started));
            l.metric("candidates", candidate_count as f64);
        });

        // 3. REDUCE: merge, score, validate
        let started = Instant::now();
        let consolidation = Aggregator::consolidate(&candidates, &self.config.aggregation);
        let mut discards = DiscardLog::new();
        for candidate in &consolidation.empty_tasks {
            discards.record_candidate(candidate, ValidationReason::EmptyTask);
        }

        let scorer = ConfidenceScorer::new(chunk_count, self.config.chunking.overlap_turns);
        let scored = consolidation
            .items
            .into_iter()
            .map(|item| scorer.score(item, &self.config.scoring))
            .collect();
        let items = Validator::new(&self.config.validation).validate_all(scored, &mut discards);

        let report = ExtractionReport {
            source: source.to_string(),
            chunk_count,
            candidate_count,
            items,
            discards: discards.summary(),
            discarded: discards.entries().to_vec(),
            warnings,
        };

        with_logger(&self.logger, |l| {
            l.timing("reduce", elapsed_ms(started));
            l.metric("items", report.items.len() as f64);
            l.metric("flagged", report.flagged().count() as f64);
            l.metric("discarded", report.discards.count as f64);
            l.info(&format!(
                "Consolidated {candidate_count} candidate(s) into {} item(s)",
                report.items.len()
            ));
            l.summary();
        });

        Ok(report)
    }

    /// Forwards MAP progress to the logger, then to the caller's callback.
    /// Returns `false` once the caller's cancel flag is raised.
    fn progress_callback(&self) -> Box<dyn Fn(usize, usize) -> bool + Send> {
        let logger = self.logger.clone();
        let user = self.on_progress.clone();
        let external = self.cancelled.clone();
        Box::new(move |done, total| {
            with_logger(&logger, |l| l.progress(done, total));
            if external.load(Ordering::Relaxed) {
                return false;
            }
            user.as_ref().map_or(true, |cb| cb(done, total))
        })
    }
}

fn with_logger(logger: &SharedLogger, f: impl FnOnce(&mut dyn PipelineLogger)) {
    if let Ok(mut guard) = logger.lock() {
        f(guard.as_mut());
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
