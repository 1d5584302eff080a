use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::extraction::domain::extractor_adapter::{ChunkOutcome, ExtractionError, ExtractorAdapter};
use crate::shared::config::ExtractionConfig;
use crate::transcript::domain::transcript_chunk::TranscriptChunk;

/// Configuration for one MAP run.
pub struct MapConfig {
    pub concurrency: usize,
    pub extraction: ExtractionConfig,
    /// Called with (completed, total) chunks; returning `false` cancels the run.
    pub on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
    pub cancelled: Arc<AtomicBool>,
}

/// Abstracts how per-chunk extraction is dispatched.
///
/// This is a port (application-layer interface). Implementations must
/// return one outcome per chunk, ordered by chunk index, and only after
/// every chunk has finished. The first fatal error cancels outstanding
/// chunks and is returned instead of partial results.
pub trait MapExecutor: Send {
    fn execute(
        &self,
        adapter: Arc<ExtractorAdapter>,
        chunks: Vec<TranscriptChunk>,
        config: MapConfig,
    ) -> Result<Vec<ChunkOutcome>, ExtractionError>;
}
