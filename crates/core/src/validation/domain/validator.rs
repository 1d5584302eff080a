use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::validation_result::{ValidationReason, ValidationResult, ValidationStatus};
use crate::consolidation::domain::confidence_scorer::ScoredItem;
use crate::consolidation::domain::text_similarity::{normalize, TaskFingerprint};
use crate::extraction::domain::raw_candidate::RawCandidate;
use crate::shared::config::{AmbiguousDeadlinePolicy, ValidationConfig};
use crate::shared::constants::VAGUE_TASK_TERMS;

/// Something removed from the result set, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscardEntry {
    pub reason: ValidationReason,
    pub task: String,
    pub owner: Option<String>,
    pub chunks: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscardSummary {
    pub count: usize,
    pub reasons: BTreeMap<ValidationReason, usize>,
}

/// Everything dropped during a run: rejected candidates and dropped items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscardLog {
    entries: Vec<DiscardEntry>,
}

impl DiscardLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_candidate(&mut self, candidate: &RawCandidate, reason: ValidationReason) {
        self.entries.push(DiscardEntry {
            reason,
            task: candidate.task.clone(),
            owner: candidate.owner.clone(),
            chunks: vec![candidate.chunk_index],
        });
    }

    pub fn record_item(&mut self, result: &ValidationResult) {
        let item = &result.scored.item;
        let reason = result
            .reasons
            .first()
            .copied()
            .unwrap_or(ValidationReason::EmptyTask);
        self.entries.push(DiscardEntry {
            reason,
            task: item.task.clone(),
            owner: item.owner.clone(),
            chunks: item.supporting_chunks.iter().copied().collect(),
        });
    }

    pub fn entries(&self) -> &[DiscardEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> DiscardSummary {
        let mut reasons = BTreeMap::new();
        for entry in &self.entries {
            *reasons.entry(entry.reason).or_insert(0) += 1;
        }
        DiscardSummary {
            count: self.entries.len(),
            reasons,
        }
    }
}

/// Applies the edge-case rules to each scored item in a fixed order.
///
/// Every item starts accepted. Rules only ever lower the status, and an
/// empty task ends evaluation because dropping is terminal.
pub struct Validator<'a> {
    config: &'a ValidationConfig,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a ValidationConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, scored: ScoredItem) -> ValidationResult {
        let mut result = ValidationResult::accepted(scored);
        let item = &result.scored.item;

        if normalize(&item.task).is_empty() {
            result.downgrade(ValidationStatus::Dropped, ValidationReason::EmptyTask);
            return result;
        }

        let mut flags = Vec::new();
        if item.owner.as_deref().map_or(true, |o| o.trim().is_empty()) {
            flags.push(ValidationReason::MissingOwner);
        }
        if self.config.ambiguous_deadline_policy == AmbiguousDeadlinePolicy::Flag {
            if let Some(deadline) = &item.deadline {
                if !deadline.is_recognized()
                    || deadline.mentions_any(&self.config.vague_deadline_terms)
                {
                    flags.push(ValidationReason::AmbiguousDeadline);
                }
            }
        }
        if item.has_conflicts() {
            flags.push(ValidationReason::MergeConflict);
        }
        if result.confidence() < self.config.confidence_threshold {
            flags.push(ValidationReason::LowConfidence);
        }
        if self.config.flag_vague_tasks && is_vague_task(&item.task) {
            flags.push(ValidationReason::VagueTask);
        }
        if self.config.flag_multiple_owners
            && item.owner.as_deref().is_some_and(names_several_people)
        {
            flags.push(ValidationReason::MultipleOwners);
        }

        for reason in flags {
            result.downgrade(ValidationStatus::Flagged, reason);
        }
        result
    }

    /// Validates all items, returning the kept ones in input order and
    /// moving dropped ones into `discards`.
    pub fn validate_all(
        &self,
        items: Vec<ScoredItem>,
        discards: &mut DiscardLog,
    ) -> Vec<ValidationResult> {
        let mut kept = Vec::with_capacity(items.len());
        for scored in items {
            let result = self.validate(scored);
            if result.is_dropped() {
                discards.record_item(&result);
            } else {
                kept.push(result);
            }
        }
        kept
    }
}

/// A task built around filler words ("look into stuff") with at most two
/// other content words.
fn is_vague_task(task: &str) -> bool {
    let fingerprint = TaskFingerprint::new(task);
    let tokens = fingerprint.tokens();
    let vague = tokens
        .iter()
        .filter(|t| VAGUE_TASK_TERMS.contains(&t.as_str()))
        .count();
    vague > 0 && tokens.len() - vague <= 2
}

fn names_several_people(owner: &str) -> bool {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let separator = SEPARATOR.get_or_init(|| {
        Regex::new(r"(?i)\s*(?:,|&|/|;|\band\b|\bor\b|\bplus\b)\s*")
            .expect("owner separator is a valid regex")
    });
    separator
        .split(owner)
        .filter(|part| !part.trim().is_empty())
        .count()
        > 1
}
