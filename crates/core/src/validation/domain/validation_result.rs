use serde::Serialize;

use crate::consolidation::domain::confidence_scorer::ScoredItem;

/// Ordered from best to worst; an item's status only ever moves rightwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Accepted,
    Flagged,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    EmptyTask,
    MissingOwner,
    AmbiguousDeadline,
    MergeConflict,
    LowConfidence,
    VagueTask,
    MultipleOwners,
}

impl ValidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyTask => "empty_task",
            Self::MissingOwner => "missing_owner",
            Self::AmbiguousDeadline => "ambiguous_deadline",
            Self::MergeConflict => "merge_conflict",
            Self::LowConfidence => "low_confidence",
            Self::VagueTask => "vague_task",
            Self::MultipleOwners => "multiple_owners",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored item with its final status and the rules it triggered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    #[serde(flatten)]
    pub scored: ScoredItem,
    pub status: ValidationStatus,
    pub reasons: Vec<ValidationReason>,
}

impl ValidationResult {
    pub fn accepted(scored: ScoredItem) -> Self {
        Self {
            scored,
            status: ValidationStatus::Accepted,
            reasons: Vec::new(),
        }
    }

    /// Records `reason` and lowers the status to at least `status`.
    pub fn downgrade(&mut self, status: ValidationStatus, reason: ValidationReason) {
        self.status = self.status.max(status);
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.status == ValidationStatus::Dropped
    }

    pub fn task(&self) -> &str {
        &self.scored.item.task
    }

    pub fn confidence(&self) -> f64 {
        self.scored.confidence
    }
}
