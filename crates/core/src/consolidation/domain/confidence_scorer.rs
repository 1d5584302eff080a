use serde::Serialize;

use super::consolidated_item::ConsolidatedItem;
use crate::shared::config::ScoringConfig;

/// The three signals behind a confidence score, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceSignals {
    pub agreement: f64,
    pub completeness: f64,
    pub extractor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    #[serde(flatten)]
    pub item: ConsolidatedItem,
    pub confidence: f64,
    pub signals: ConfidenceSignals,
}

/// Scores consolidated items as a capped weighted sum of agreement,
/// field completeness and extractor-reported confidence.
///
/// Agreement counts the distinct chunks that produced an item against the
/// number of chunks that can see any one stretch of the transcript: two
/// when chunks overlap, otherwise one. The count is transcript-wide, not per
/// item: candidates carry no turn position, so an item mentioned mid-chunk,
/// which only one chunk can see, is still measured against two and its
/// agreement stays at 0.5. Only items repeated across an overlap reach 1.0.
pub struct ConfidenceScorer {
    covering_chunks: usize,
}

impl ConfidenceScorer {
    pub fn new(total_chunks: usize, overlap_turns: usize) -> Self {
        let per_span = if overlap_turns > 0 { 2 } else { 1 };
        Self {
            covering_chunks: per_span.min(total_chunks).max(1),
        }
    }

    pub fn covering_chunks(&self) -> usize {
        self.covering_chunks
    }

    pub fn score(&self, item: ConsolidatedItem, config: &ScoringConfig) -> ScoredItem {
        let signals = self.signals(&item, config);
        let weighted = config.agreement_weight * signals.agreement
            + config.completeness_weight * signals.completeness
            + config.extractor_weight * signals.extractor;
        ScoredItem {
            item,
            confidence: weighted.clamp(0.0, 1.0),
            signals,
        }
    }

    fn signals(&self, item: &ConsolidatedItem, config: &ScoringConfig) -> ConfidenceSignals {
        let supporting = item.supporting_chunks.len().min(self.covering_chunks);
        let agreement = supporting as f64 / self.covering_chunks as f64;

        let present = [
            !item.task.trim().is_empty(),
            item.owner.as_deref().is_some_and(|o| !o.trim().is_empty()),
            item.deadline.as_ref().is_some_and(|d| !d.raw.trim().is_empty()),
        ]
        .iter()
        .filter(|&&p| p)
        .count();
        let completeness = present as f64 / 3.0;

        let extractor = item
            .extractor_confidence
            .unwrap_or(config.neutral_extractor_confidence)
            .clamp(0.0, 1.0);

        ConfidenceSignals {
            agreement,
            completeness,
            extractor,
        }
    }
}
