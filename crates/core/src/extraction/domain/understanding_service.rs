use thiserror::Error;

use super::extraction_prompt::ExtractionPrompt;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("service rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Domain interface for the external text-understanding service.
///
/// Implementations turn a prompt into the service's raw text answer. They
/// must be shareable across extraction workers and hold no per-chunk state.
pub trait UnderstandingService: Send + Sync {
    fn complete(&self, prompt: &ExtractionPrompt) -> Result<String, ServiceError>;
}
