use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use super::extraction_prompt::{ExtractionPrompt, PromptStrictness};
use super::raw_candidate::RawCandidate;
use super::response_schema::ResponseSchema;
use super::understanding_service::{ServiceError, UnderstandingService};
use crate::shared::config::ExtractionConfig;
use crate::transcript::domain::transcript_chunk::TranscriptChunk;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("extraction failed for chunk {chunk_index} after {attempts} attempt(s): {source}")]
    ServiceExhausted {
        chunk_index: usize,
        attempts: u32,
        #[source]
        source: ServiceError,
    },
    #[error("extraction of chunk {chunk_index} was cancelled")]
    Cancelled { chunk_index: usize },
    #[error("extraction worker panicked")]
    WorkerPanicked,
}

/// Non-fatal note about a chunk whose output had to be discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkWarning {
    pub chunk_index: usize,
    pub attempts: u32,
    pub message: String,
}

/// Terminal result of extracting one chunk, short of a fatal error.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Extracted {
        candidates: Vec<RawCandidate>,
        attempts: u32,
    },
    /// Every attempt returned a malformed response; the chunk counts as empty.
    Degraded(ChunkWarning),
}

impl ChunkOutcome {
    pub fn candidates(&self) -> &[RawCandidate] {
        match self {
            ChunkOutcome::Extracted { candidates, .. } => candidates,
            ChunkOutcome::Degraded(_) => &[],
        }
    }

    pub fn warning(&self) -> Option<&ChunkWarning> {
        match self {
            ChunkOutcome::Extracted { .. } => None,
            ChunkOutcome::Degraded(w) => Some(w),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Failures {
    parse: u32,
    service: u32,
}

impl Failures {
    fn attempts(&self) -> u32 {
        self.parse + self.service + 1
    }
}

enum RetryState {
    Attempt {
        strictness: PromptStrictness,
        failures: Failures,
    },
    Backoff {
        delay: Duration,
        strictness: PromptStrictness,
        failures: Failures,
    },
    Finished(Result<ChunkOutcome, ExtractionError>),
}

/// Boundary to the understanding service for one chunk at a time.
///
/// Malformed responses are retried with a stricter prompt up to
/// `max_parse_retries` times, then the chunk degrades to empty. Service
/// failures are retried with exponential backoff up to
/// `max_service_retries` times, then the run fails. Holds no per-chunk state.
pub struct ExtractorAdapter {
    service: Arc<dyn UnderstandingService>,
}

impl ExtractorAdapter {
    pub fn new(service: Arc<dyn UnderstandingService>) -> Self {
        Self { service }
    }

    pub fn extract(
        &self,
        chunk: &TranscriptChunk,
        total_chunks: usize,
        config: &ExtractionConfig,
        cancelled: &AtomicBool,
    ) -> Result<ChunkOutcome, ExtractionError> {
        let mut state = RetryState::Attempt {
            strictness: PromptStrictness::Standard,
            failures: Failures::default(),
        };

        loop {
            state = match state {
                RetryState::Finished(result) => return result,
                RetryState::Attempt {
                    strictness,
                    failures,
                } => self.attempt(chunk, total_chunks, config, cancelled, strictness, failures),
                RetryState::Backoff {
                    delay,
                    strictness,
                    failures,
                } => {
                    if wait_unless_cancelled(delay, cancelled) {
                        RetryState::Attempt {
                            strictness,
                            failures,
                        }
                    } else {
                        RetryState::Finished(Err(ExtractionError::Cancelled {
                            chunk_index: chunk.index(),
                        }))
                    }
                }
            };
        }
    }

    fn attempt(
        &self,
        chunk: &TranscriptChunk,
        total_chunks: usize,
        config: &ExtractionConfig,
        cancelled: &AtomicBool,
        strictness: PromptStrictness,
        mut failures: Failures,
    ) -> RetryState {
        let chunk_index = chunk.index();
        if cancelled.load(Ordering::Relaxed) {
            return RetryState::Finished(Err(ExtractionError::Cancelled { chunk_index }));
        }

        let attempts = failures.attempts();
        let prompt = ExtractionPrompt::for_chunk(chunk, total_chunks, strictness);

        match self.service.complete(&prompt) {
            Ok(response) => match ResponseSchema::parse(&response, chunk_index) {
                Ok(candidates) => {
                    log::debug!(
                        "Chunk {chunk_index}: {} candidate(s) after {attempts} attempt(s)",
                        candidates.len()
                    );
                    RetryState::Finished(Ok(ChunkOutcome::Extracted {
                        candidates,
                        attempts,
                    }))
                }
                Err(e) => {
                    failures.parse += 1;
                    if failures.parse > config.max_parse_retries {
                        log::warn!(
                            "Chunk {chunk_index}: giving up after {attempts} malformed response(s): {e}"
                        );
                        RetryState::Finished(Ok(ChunkOutcome::Degraded(ChunkWarning {
                            chunk_index,
                            attempts,
                            message: format!("malformed extractor response: {e}"),
                        })))
                    } else {
                        log::debug!("Chunk {chunk_index}: malformed response ({e}), retrying strictly");
                        RetryState::Attempt {
                            strictness: PromptStrictness::Strict {
                                retry: failures.parse,
                            },
                            failures,
                        }
                    }
                }
            },
            Err(e) => {
                failures.service += 1;
                if failures.service > config.max_service_retries {
                    RetryState::Finished(Err(ExtractionError::ServiceExhausted {
                        chunk_index,
                        attempts,
                        source: e,
                    }))
                } else {
                    let delay = backoff_delay(config, failures.service);
                    log::warn!(
                        "Chunk {chunk_index}: {e}; retrying in {}ms",
                        delay.as_millis()
                    );
                    RetryState::Backoff {
                        delay,
                        strictness,
                        failures,
                    }
                }
            }
        }
    }
}

/// Exponential backoff for the `retry`-th service retry (1-based), capped.
pub fn backoff_delay(config: &ExtractionConfig, retry: u32) -> Duration {
    let shift = retry.saturating_sub(1).min(20);
    let ms = config
        .initial_backoff_ms
        .saturating_mul(1u64 << shift)
        .min(config.max_backoff_ms);
    Duration::from_millis(ms)
}

/// Sleeps for `delay`, waking periodically to check for cancellation.
/// Returns false if cancelled before the delay elapsed.
fn wait_unless_cancelled(delay: Duration, cancelled: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
    }
}
