use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::extraction::domain::extractor_adapter::{ChunkOutcome, ExtractionError, ExtractorAdapter};
use crate::pipeline::map_executor::{MapConfig, MapExecutor};
use crate::shared::config::ExtractionConfig;
use crate::transcript::domain::transcript_chunk::TranscriptChunk;

type ChunkResult = (usize, Result<ChunkOutcome, ExtractionError>);

/// Runs chunk extractions on a fixed pool of worker threads.
///
/// Layout: `job queue → N workers [extract] → main [collect]`
///
/// Workers pull chunks from a shared queue so at most `concurrency`
/// service calls are in flight. The main thread collects results until
/// every worker has exited, which is the barrier before REDUCE.
pub struct ThreadedMapExecutor;

impl ThreadedMapExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ThreadedMapExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MapExecutor for ThreadedMapExecutor {
    fn execute(
        &self,
        adapter: Arc<ExtractorAdapter>,
        chunks: Vec<TranscriptChunk>,
        config: MapConfig,
    ) -> Result<Vec<ChunkOutcome>, ExtractionError> {
        let total = chunks.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let workers = config.concurrency.clamp(1, total);

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<TranscriptChunk>();
        for chunk in chunks {
            if job_tx.send(chunk).is_err() {
                break;
            }
        }
        drop(job_tx);

        let (result_tx, result_rx) = crossbeam_channel::bounded::<ChunkResult>(workers);
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                spawn_worker(
                    adapter.clone(),
                    job_rx.clone(),
                    result_tx.clone(),
                    total,
                    config.extraction.clone(),
                    config.cancelled.clone(),
                )
            })
            .collect();
        drop(job_rx);
        drop(result_tx);

        let collected = collect_results(result_rx, total, &config);
        join_workers(handles, collected)
    }
}

fn spawn_worker(
    adapter: Arc<ExtractorAdapter>,
    job_rx: Receiver<TranscriptChunk>,
    result_tx: Sender<ChunkResult>,
    total: usize,
    extraction: ExtractionConfig,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for chunk in job_rx {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let result = adapter.extract(&chunk, total, &extraction, &cancelled);
            if result_tx.send((chunk.index(), result)).is_err() {
                break;
            }
        }
    })
}

struct Collected {
    slots: Vec<Option<ChunkOutcome>>,
    error: Option<ExtractionError>,
}

/// Drains the result channel. A fatal error raises the cancel flag so
/// the remaining workers stop early; the first non-cancellation error wins.
fn collect_results(result_rx: Receiver<ChunkResult>, total: usize, config: &MapConfig) -> Collected {
    let mut slots: Vec<Option<ChunkOutcome>> = (0..total).map(|_| None).collect();
    let mut error: Option<ExtractionError> = None;
    let mut completed = 0;

    for (index, result) in result_rx {
        match result {
            Ok(outcome) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(outcome);
                }
                completed += 1;
                if let Some(ref cb) = config.on_progress {
                    if !cb(completed, total) {
                        config.cancelled.store(true, Ordering::Relaxed);
                    }
                }
            }
            Err(e) => {
                config.cancelled.store(true, Ordering::Relaxed);
                let replace = match &error {
                    None => true,
                    Some(ExtractionError::Cancelled { .. }) => {
                        !matches!(e, ExtractionError::Cancelled { .. })
                    }
                    Some(_) => false,
                };
                if replace {
                    error = Some(e);
                }
            }
        }
    }

    Collected { slots, error }
}

fn join_workers(
    handles: Vec<JoinHandle<()>>,
    collected: Collected,
) -> Result<Vec<ChunkOutcome>, ExtractionError> {
    let mut panicked = false;
    for handle in handles {
        if handle.join().is_err() {
            panicked = true;
        }
    }

    if let Some(e) = collected.error {
        if !matches!(e, ExtractionError::Cancelled { .. }) || !panicked {
            return Err(e);
        }
    }
    if panicked {
        return Err(ExtractionError::WorkerPanicked);
    }

    let mut outcomes = Vec::with_capacity(collected.slots.len());
    for (chunk_index, slot) in collected.slots.into_iter().enumerate() {
        match slot {
            Some(outcome) => outcomes.push(outcome),
            None => return Err(ExtractionError::Cancelled { chunk_index }),
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::domain::extraction_prompt::ExtractionPrompt;
    use crate::extraction::domain::understanding_service::{ServiceError, UnderstandingService};
    use crate::shared::config::ChunkingConfig;
    use crate::transcript::domain::chunker::Chunker;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    // --- Stubs ---

    /// Echoes the chunk index as one candidate, failing for listed chunks.
    struct EchoService {
        fail_chunks: Vec<usize>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<usize>>,
        delay: Duration,
    }

    impl EchoService {
        fn new(fail_chunks: Vec<usize>, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                fail_chunks,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                delay: Duration::from_millis(delay_ms),
            })
        }
    }

    impl UnderstandingService for EchoService {
        fn complete(&self, prompt: &ExtractionPrompt) -> Result<String, ServiceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(prompt.chunk_index);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_chunks.contains(&prompt.chunk_index) {
                return Err(ServiceError::Rejected {
                    status: 401,
                    message: "bad key".to_string(),
                });
            }
            Ok(format!(r#"[{{"task": "Task from chunk {}"}}]"#, prompt.chunk_index))
        }
    }

    fn chunks(n: usize) -> Vec<TranscriptChunk> {
        let transcript: String = (0..n)
            .map(|i| format!("Speaker{i}: line number {i}\n"))
            .collect();
        let config = ChunkingConfig {
            max_turns: 1,
            overlap_turns: 0,
            ..ChunkingConfig::default()
        };
        Chunker::chunk(&transcript, &config).unwrap()
    }

    fn map_config(concurrency: usize) -> MapConfig {
        MapConfig {
            concurrency,
            extraction: ExtractionConfig {
                max_parse_retries: 0,
                max_service_retries: 0,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            },
            on_progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_outcomes_are_ordered_by_chunk_index() {
        let service = EchoService::new(vec![], 5);
        let adapter = Arc::new(ExtractorAdapter::new(service));
        let outcomes = ThreadedMapExecutor::new()
            .execute(adapter, chunks(6), map_config(3))
            .unwrap();

        assert_eq!(outcomes.len(), 6);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.candidates()[0].chunk_index, i);
            assert_eq!(outcome.candidates()[0].task, format!("Task from chunk {i}"));
        }
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let service = EchoService::new(vec![], 20);
        let adapter = Arc::new(ExtractorAdapter::new(service.clone()));
        ThreadedMapExecutor::new()
            .execute(adapter, chunks(8), map_config(2))
            .unwrap();

        assert!(service.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(service.calls.lock().unwrap().len(), 8);
    }

    #[test]
    fn test_fatal_error_cancels_run() {
        let service = EchoService::new(vec![0], 10);
        let adapter = Arc::new(ExtractorAdapter::new(service.clone()));
        let config = map_config(1);
        let cancelled = config.cancelled.clone();
        let err = ThreadedMapExecutor::new()
            .execute(adapter, chunks(5), config)
            .unwrap_err();

        assert!(matches!(
            err,
            ExtractionError::ServiceExhausted { chunk_index: 0, .. }
        ));
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(service.calls.lock().unwrap().len() < 5);
    }

    #[test]
    fn test_progress_reports_each_chunk() {
        let service = EchoService::new(vec![], 0);
        let adapter = Arc::new(ExtractorAdapter::new(service));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let mut config = map_config(2);
        config.on_progress = Some(Box::new(move |done, total| {
            seen_cb.lock().unwrap().push((done, total));
            true
        }));

        ThreadedMapExecutor::new()
            .execute(adapter, chunks(4), config)
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(*seen.last().unwrap(), (4, 4));
    }

    #[test]
    fn test_progress_callback_can_cancel() {
        let service = EchoService::new(vec![], 20);
        let adapter = Arc::new(ExtractorAdapter::new(service));
        let mut config = map_config(1);
        config.on_progress = Some(Box::new(|_, _| false));

        let err = ThreadedMapExecutor::new()
            .execute(adapter, chunks(8), config)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Cancelled { .. }));
    }

    #[test]
    fn test_pre_cancelled_run_does_no_work() {
        let service = EchoService::new(vec![], 0);
        let adapter = Arc::new(ExtractorAdapter::new(service.clone()));
        let config = map_config(2);
        config.cancelled.store(true, Ordering::SeqCst);

        let err = ThreadedMapExecutor::new()
            .execute(adapter, chunks(3), config)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Cancelled { chunk_index: 0 }));
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_chunks_is_empty_result() {
        let service = EchoService::new(vec![], 0);
        let adapter = Arc::new(ExtractorAdapter::new(service));
        let outcomes = ThreadedMapExecutor::new()
            .execute(adapter, Vec::new(), map_config(4))
            .unwrap();
        assert!(outcomes.is_empty());
    }
}
