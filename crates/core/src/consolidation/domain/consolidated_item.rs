use std::collections::BTreeSet;

use serde::Serialize;

use super::deadline::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    Owner,
    Deadline,
}

/// Candidates in one group disagreed on a field; `resolved` is the value kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeConflict {
    pub field: ConflictField,
    /// Distinct competing values in first-seen chunk order.
    pub values: Vec<String>,
    pub resolved: String,
}

/// One deduplicated action item produced by merging similar candidates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedItem {
    pub task: String,
    pub owner: Option<String>,
    pub deadline: Option<Deadline>,
    pub supporting_chunks: BTreeSet<usize>,
    /// Number of raw candidates merged into this item.
    pub merge_count: usize,
    pub conflicts: Vec<MergeConflict>,
    /// Mean of the extractor-reported confidences, if any were reported.
    pub extractor_confidence: Option<f64>,
    pub speaker: Option<String>,
    /// Distinct extractor notes, in chunk order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ConsolidatedItem {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn conflict_on(&self, field: ConflictField) -> Option<&MergeConflict> {
        self.conflicts.iter().find(|c| c.field == field)
    }

    pub fn first_chunk(&self) -> Option<usize> {
        self.supporting_chunks.first().copied()
    }
}
