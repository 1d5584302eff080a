use super::response_schema::ResponseSchema;
use crate::transcript::domain::transcript_chunk::TranscriptChunk;

const SYSTEM_PROMPT: &str = "You extract action items from meeting transcripts. \
An action item is a concrete commitment or request for someone to do something. \
Do not invent owners or deadlines that are not stated in the excerpt.";

const STRICT_SUFFIX: &str = "Your previous answer could not be parsed. \
Output ONLY the JSON array, with no prose, no markdown fences and no trailing text. \
Every element MUST contain a \"task\" string.";

/// How insistent the prompt is about the response format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStrictness {
    Standard,
    /// Reformulation used after a malformed response; `retry` counts from 1.
    Strict { retry: u32 },
}

/// Request sent to the understanding service for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPrompt {
    pub chunk_index: usize,
    pub system: String,
    pub user: String,
    pub strictness: PromptStrictness,
}

impl ExtractionPrompt {
    pub fn for_chunk(
        chunk: &TranscriptChunk,
        total_chunks: usize,
        strictness: PromptStrictness,
    ) -> Self {
        let mut user = format!(
            "Transcript excerpt {} of {}",
            chunk.index() + 1,
            total_chunks
        );
        if chunk.overlaps_previous() {
            user.push_str(&format!(
                " (the first {} turn(s) repeat the end of the previous excerpt)",
                chunk.overlap_turns()
            ));
        }
        user.push_str(":\n\n");
        user.push_str(chunk.text());
        user.push_str("\n\n");
        let speakers: Vec<&str> = chunk.speakers().iter().map(String::as_str).collect();
        user.push_str(&format!(
            "Speakers in this excerpt: {}. Owners are usually one of them.\n\n",
            speakers.join(", ")
        ));
        user.push_str(&ResponseSchema::describe());

        if let PromptStrictness::Strict { .. } = strictness {
            user.push_str("\n\n");
            user.push_str(STRICT_SUFFIX);
        }

        Self {
            chunk_index: chunk.index(),
            system: SYSTEM_PROMPT.to_string(),
            user,
            strictness,
        }
    }
}
