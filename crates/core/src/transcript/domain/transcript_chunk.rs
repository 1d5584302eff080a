use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use super::speaker_turn::SpeakerTurn;

/// A contiguous, turn-aligned slice of a transcript sent to the extractor.
///
/// Built only by the chunker; fields are read through accessors so a chunk
/// cannot change after it has been handed to the extraction stage.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptChunk {
    index: usize,
    text: String,
    speakers: BTreeSet<String>,
    start_time: Option<f64>,
    end_time: Option<f64>,
    overlaps_previous: bool,
    turn_range: RangeInclusive<usize>,
    overlap_turns: usize,
}

impl TranscriptChunk {
    /// Builds a chunk from its turns. `overlap_turns` leading turns repeat the
    /// previous chunk. `turns` must not be empty.
    pub(crate) fn from_turns(index: usize, turns: &[SpeakerTurn], overlap_turns: usize) -> Self {
        let text = turns
            .iter()
            .map(SpeakerTurn::render)
            .collect::<Vec<_>>()
            .join("\n");
        let speakers = turns.iter().map(|t| t.speaker.clone()).collect();
        let start_time = turns.iter().find_map(|t| t.timestamp);
        let end_time = turns.iter().rev().find_map(|t| t.timestamp);
        let first = turns.first().map_or(0, |t| t.index);
        let last = turns.last().map_or(first, |t| t.index);

        Self {
            index,
            text,
            speakers,
            start_time,
            end_time,
            overlaps_previous: overlap_turns > 0,
            turn_range: first..=last,
            overlap_turns,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn speakers(&self) -> &BTreeSet<String> {
        &self.speakers
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    pub fn overlaps_previous(&self) -> bool {
        self.overlaps_previous
    }

    /// Transcript turn indices covered by this chunk, overlap included.
    pub fn turn_range(&self) -> &RangeInclusive<usize> {
        &self.turn_range
    }

    /// Number of leading turns repeated from the previous chunk.
    pub fn overlap_turns(&self) -> usize {
        self.overlap_turns
    }

    pub fn turn_count(&self) -> usize {
        self.turn_range.end() - self.turn_range.start() + 1
    }
}
