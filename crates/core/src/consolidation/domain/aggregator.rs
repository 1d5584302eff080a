use std::collections::BTreeSet;

use super::consolidated_item::{ConflictField, ConsolidatedItem, MergeConflict};
use super::deadline::Deadline;
use super::text_similarity::{normalize, TaskFingerprint};
use crate::extraction::domain::raw_candidate::RawCandidate;
use crate::shared::config::{AggregationConfig, ConflictTieBreak};

/// Result of merging all candidates of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidation {
    /// Items in order of their earliest supporting candidate.
    pub items: Vec<ConsolidatedItem>,
    /// Candidates rejected before grouping because their task text is empty.
    pub empty_tasks: Vec<RawCandidate>,
}

impl Consolidation {
    /// Candidates accounted for: merged into an item or rejected.
    pub fn accounted_candidates(&self) -> usize {
        self.items.iter().map(|i| i.merge_count).sum::<usize>() + self.empty_tasks.len()
    }
}

/// Groups near-duplicate candidates across chunks and merges each group.
///
/// Grouping is deterministic: candidates are visited in chunk order (stable
/// within a chunk) and each joins the most similar open group, ties going
/// to the earliest group. A group is open to a candidate only while one of
/// its members lies within `neighbor_window` chunks.
pub struct Aggregator;

struct Group {
    members: Vec<usize>,
    owner_keys: BTreeSet<String>,
}

impl Aggregator {
    pub fn consolidate(candidates: &[RawCandidate], config: &AggregationConfig) -> Consolidation {
        let mut sorted: Vec<&RawCandidate> = candidates.iter().collect();
        sorted.sort_by_key(|c| c.chunk_index);

        let fingerprints: Vec<TaskFingerprint> =
            sorted.iter().map(|c| TaskFingerprint::new(&c.task)).collect();

        let mut groups: Vec<Group> = Vec::new();
        let mut empty_tasks = Vec::new();

        for (i, candidate) in sorted.iter().enumerate() {
            if !candidate.has_task() {
                empty_tasks.push((*candidate).clone());
                continue;
            }
            let owner_key = candidate.owner.as_deref().map(normalize);

            let mut best: Option<(usize, f64)> = None;
            for (g, group) in groups.iter().enumerate() {
                let similarity = group
                    .members
                    .iter()
                    .filter(|&&m| {
                        candidate.chunk_index - sorted[m].chunk_index <= config.neighbor_window
                    })
                    .map(|&m| fingerprints[m].similarity(&fingerprints[i]))
                    .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));
                let Some(similarity) = similarity else {
                    continue;
                };
                if similarity < config.similarity_threshold {
                    continue;
                }
                let owners_agree = match &owner_key {
                    None => true,
                    Some(key) => group.owner_keys.is_empty() || group.owner_keys.contains(key),
                };
                if !owners_agree && similarity < config.conflict_similarity_threshold {
                    continue;
                }
                if best.map_or(true, |(_, s)| similarity > s) {
                    best = Some((g, similarity));
                }
            }

            let group = match best {
                Some((g, similarity)) => {
                    log::debug!(
                        "Merging \"{}\" (chunk {}) into item {g} (similarity {similarity:.2})",
                        candidate.task.trim(),
                        candidate.chunk_index
                    );
                    &mut groups[g]
                }
                None => {
                    groups.push(Group {
                        members: Vec::new(),
                        owner_keys: BTreeSet::new(),
                    });
                    let last = groups.len() - 1;
                    &mut groups[last]
                }
            };
            group.members.push(i);
            if let Some(key) = owner_key {
                group.owner_keys.insert(key);
            }
        }

        let items = groups
            .iter()
            .map(|group| {
                let members: Vec<&RawCandidate> =
                    group.members.iter().map(|&m| sorted[m]).collect();
                merge_group(&members, config.tie_break)
            })
            .collect();

        Consolidation { items, empty_tasks }
    }
}

/// Merges one group of candidates, given in chunk order.
fn merge_group(members: &[&RawCandidate], tie_break: ConflictTieBreak) -> ConsolidatedItem {
    let mut task = members[0].task.trim();
    for member in &members[1..] {
        let text = member.task.trim();
        if text.chars().count() > task.chars().count() {
            task = text;
        }
    }

    let mut conflicts = Vec::new();

    let owner_ballots = members.iter().filter_map(|m| {
        m.owner
            .as_deref()
            .map(|o| (normalize(o), o.trim().to_string(), m.chunk_index))
    });
    let owner = elect(owner_ballots, tie_break).map(|(winner, competing)| {
        if let Some(values) = competing {
            conflicts.push(MergeConflict {
                field: ConflictField::Owner,
                values,
                resolved: winner.clone(),
            });
        }
        winner
    });

    let deadlines: Vec<(Deadline, usize)> = members
        .iter()
        .filter_map(|m| m.deadline.as_deref().map(|d| (Deadline::parse(d), m.chunk_index)))
        .collect();
    let deadline_ballots = deadlines
        .iter()
        .map(|(d, chunk)| (d.vote_key(), d.vote_key(), *chunk));
    let deadline = elect(deadline_ballots, tie_break).and_then(|(key, competing)| {
        let chosen = deadlines
            .iter()
            .find(|(d, _)| d.vote_key() == key)
            .map(|(d, _)| d.clone())?;
        if let Some(keys) = competing {
            let values = keys
                .iter()
                .filter_map(|k| deadlines.iter().find(|(d, _)| &d.vote_key() == k))
                .map(|(d, _)| d.text().to_string())
                .collect();
            conflicts.push(MergeConflict {
                field: ConflictField::Deadline,
                values,
                resolved: chosen.text().to_string(),
            });
        }
        Some(chosen)
    });

    for conflict in &conflicts {
        log::warn!(
            "Conflicting {:?} values for \"{task}\": {}; kept {}",
            conflict.field,
            conflict.values.join(" vs "),
            conflict.resolved
        );
    }

    let mut notes: Vec<String> = Vec::new();
    for note in members.iter().filter_map(|m| m.notes.as_deref()) {
        if !notes.iter().any(|n| normalize(n) == normalize(note)) {
            notes.push(note.to_string());
        }
    }

    let reported: Vec<f64> = members.iter().filter_map(|m| m.local_confidence).collect();
    let extractor_confidence =
        (!reported.is_empty()).then(|| reported.iter().sum::<f64>() / reported.len() as f64);

    ConsolidatedItem {
        task: task.to_string(),
        owner,
        deadline,
        supporting_chunks: members.iter().map(|m| m.chunk_index).collect(),
        merge_count: members.len(),
        conflicts,
        extractor_confidence,
        speaker: members.iter().find_map(|m| m.speaker.clone()),
        notes,
    }
}

struct Tally {
    key: String,
    display: String,
    count: usize,
    first_chunk: usize,
    last_chunk: usize,
}

/// Majority vote over `(key, display, chunk)` ballots given in chunk order.
///
/// Returns the winning display value, plus the distinct competing displays
/// in first-seen order when more than one key received votes.
fn elect(
    ballots: impl Iterator<Item = (String, String, usize)>,
    tie_break: ConflictTieBreak,
) -> Option<(String, Option<Vec<String>>)> {
    let mut tallies: Vec<Tally> = Vec::new();
    for (key, display, chunk) in ballots {
        match tallies.iter_mut().find(|t| t.key == key) {
            Some(t) => {
                t.count += 1;
                t.last_chunk = chunk;
            }
            None => tallies.push(Tally {
                key,
                display,
                count: 1,
                first_chunk: chunk,
                last_chunk: chunk,
            }),
        }
    }

    let winner = tallies.iter().reduce(|best, t| {
        let wins_tie = match tie_break {
            ConflictTieBreak::EarliestChunk => t.first_chunk < best.first_chunk,
            ConflictTieBreak::LatestChunk => t.last_chunk > best.last_chunk,
        };
        if t.count > best.count || (t.count == best.count && wins_tie) {
            t
        } else {
            best
        }
    })?;

    let competing = (tallies.len() > 1).then(|| tallies.iter().map(|t| t.display.clone()).collect());
    Some((winner.display.clone(), competing))
}
