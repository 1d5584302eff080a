use std::ops::Range;

use thiserror::Error;

use super::speaker_turn::{parse_turns, SpeakerTurn};
use super::transcript_chunk::TranscriptChunk;
use crate::shared::config::ChunkingConfig;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("transcript is empty")]
    EmptyTranscript,
    #[error("transcript has no recognizable `Speaker: utterance` turns")]
    NoSpeakerTurns,
}

/// Splits transcripts into overlapping, speaker-turn-aligned chunks.
///
/// A chunk grows one turn at a time and closes before the next turn when
/// it already holds `max_turns` new turns, when the next turn starts at or
/// beyond `max_duration_secs` from the chunk start, or when the speaker
/// changes after at least `min_chars` characters of new content. Every chunk
/// after the first is prefixed with the last `overlap_turns` turns of its
/// predecessor. Turns are never split.
pub struct Chunker;

impl Chunker {
    pub fn chunk(
        transcript: &str,
        config: &ChunkingConfig,
    ) -> Result<Vec<TranscriptChunk>, FormatError> {
        if transcript.trim().is_empty() {
            return Err(FormatError::EmptyTranscript);
        }

        let parsed = parse_turns(transcript);
        if parsed.turns.is_empty() {
            return Err(FormatError::NoSpeakerTurns);
        }
        if parsed.skipped_lines > 0 {
            log::debug!(
                "Skipped {} unlabeled line(s) before the first speaker turn",
                parsed.skipped_lines
            );
        }

        let turns = parsed.turns;
        let groups = plan_groups(&turns, config);
        let mut chunks = Vec::with_capacity(groups.len());
        let mut prev_start = 0;

        for (index, group) in groups.into_iter().enumerate() {
            let start = if index == 0 {
                group.start
            } else {
                group
                    .start
                    .saturating_sub(config.overlap_turns)
                    .max(prev_start)
            };
            let overlap = group.start - start;
            let chunk = TranscriptChunk::from_turns(index, &turns[start..group.end], overlap);
            log::debug!(
                "Chunk {index}: {} turn(s), {overlap} repeated",
                chunk.turn_count()
            );
            chunks.push(chunk);
            prev_start = start;
        }

        log::info!(
            "Split {} turns into {} chunk(s) (overlap {} turns)",
            turns.len(),
            chunks.len(),
            config.overlap_turns
        );
        Ok(chunks)
    }
}

/// Ranges of new (non-overlap) turns, one per chunk, covering every turn once.
fn plan_groups(turns: &[SpeakerTurn], config: &ChunkingConfig) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut chars = 0;
    let mut start_time: Option<f64> = None;

    for (i, turn) in turns.iter().enumerate() {
        if i > start && should_close(turns, start, i, chars, start_time, config) {
            groups.push(start..i);
            start = i;
            chars = 0;
            start_time = None;
        }
        chars += turn.char_len();
        if start_time.is_none() {
            start_time = turn.timestamp;
        }
    }
    groups.push(start..turns.len());
    groups
}

fn should_close(
    turns: &[SpeakerTurn],
    start: usize,
    next: usize,
    chars: usize,
    start_time: Option<f64>,
    config: &ChunkingConfig,
) -> bool {
    if next - start >= config.max_turns {
        return true;
    }

    if let (Some(limit), Some(begin), Some(at)) =
        (config.max_duration_secs, start_time, turns[next].timestamp)
    {
        if at - begin >= limit {
            return true;
        }
    }

    chars >= config.min_chars && turns[next].speaker != turns[next - 1].speaker
}
