use serde::Serialize;

/// One action item as reported by the extractor for a single chunk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RawCandidate {
    pub task: String,
    pub owner: Option<String>,
    /// Free-form deadline text exactly as extracted.
    pub deadline: Option<String>,
    pub chunk_index: usize,
    /// Extractor's own confidence in [0, 1], when it reported one.
    pub local_confidence: Option<f64>,
    /// Speaker who raised the item.
    pub speaker: Option<String>,
    pub notes: Option<String>,
}

impl RawCandidate {
    pub fn new(task: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            task: task.into(),
            owner: None,
            deadline: None,
            chunk_index,
            local_confidence: None,
            speaker: None,
            notes: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_deadline(mut self, deadline: impl Into<String>) -> Self {
        self.deadline = Some(deadline.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.local_confidence = Some(confidence);
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn has_task(&self) -> bool {
        !self.task.trim().is_empty()
    }
}
