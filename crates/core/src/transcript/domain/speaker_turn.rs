use std::sync::OnceLock;

use regex::Regex;

/// One speaker-labeled utterance, possibly spanning several transcript lines.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeakerTurn {
    /// Position of the turn in the transcript, starting at 0.
    pub index: usize,
    pub speaker: String,
    pub text: String,
    /// Offset from the start of the meeting, in seconds.
    pub timestamp: Option<f64>,
}

impl SpeakerTurn {
    /// Renders the turn back as a single `Speaker: text` line.
    pub fn render(&self) -> String {
        match self.timestamp {
            Some(ts) => format!("[{}] {}: {}", format_timestamp(ts), self.speaker, self.text),
            None => format!("{}: {}", self.speaker, self.text),
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Summary of how a transcript was split into turns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedTranscript {
    pub turns: Vec<SpeakerTurn>,
    /// Non-blank lines before the first speaker label.
    pub skipped_lines: usize,
}

/// Speaker labels are one to four words, so prose such as
/// `We agreed on three things: ...` is not mistaken for a turn.
fn turn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(?:\[(?P<bracket_ts>\d{1,2}:\d{2}(?::\d{2})?)\]\s*|(?P<bare_ts>\d{1,2}:\d{2}:\d{2})\s+)?(?P<speaker>[A-Za-z][A-Za-z0-9._'\-]*(?: +[A-Za-z0-9._'\-]+){0,3})\s*(?:\((?P<paren_ts>\d{1,2}:\d{2}(?::\d{2})?)\))?\s*:(?P<text>.*)$",
        )
        .expect("turn pattern is a valid regex")
    })
}

/// Splits raw transcript text into speaker turns.
///
/// Lines without a label continue the current turn. Lines before the first
/// label are counted in `skipped_lines`. Turns whose text ends up empty are
/// dropped and the remaining turns are re-indexed.
pub fn parse_turns(transcript: &str) -> ParsedTranscript {
    let pattern = turn_pattern();
    let mut turns: Vec<SpeakerTurn> = Vec::new();
    let mut skipped_lines = 0;

    for line in transcript.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match pattern.captures(trimmed) {
            Some(caps) => {
                let timestamp = ["bracket_ts", "bare_ts", "paren_ts"]
                    .iter()
                    .find_map(|name| caps.name(name))
                    .and_then(|m| parse_timestamp(m.as_str()));
                turns.push(SpeakerTurn {
                    index: turns.len(),
                    speaker: caps["speaker"].trim().to_string(),
                    text: caps["text"].trim().to_string(),
                    timestamp,
                });
            }
            None => match turns.last_mut() {
                Some(turn) => {
                    if !turn.text.is_empty() {
                        turn.text.push(' ');
                    }
                    turn.text.push_str(trimmed);
                }
                None => skipped_lines += 1,
            },
        }
    }

    turns.retain(|t| !t.text.is_empty());
    for (i, turn) in turns.iter_mut().enumerate() {
        turn.index = i;
    }

    ParsedTranscript {
        turns,
        skipped_lines,
    }
}

/// Parses `hh:mm:ss` or `mm:ss` into seconds.
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let parts: Vec<u32> = text
        .split(':')
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (h, m, s) = match parts.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    if m >= 60 || s >= 60 {
        return None;
    }
    Some((h * 3600 + m * 60 + s) as f64)
}

pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_plain_turns() {
        let parsed = parse_turns("Alice: Hello there\nBob: Hi Alice");
        assert_eq!(parsed.turns.len(), 2);
        assert_eq!(parsed.turns[0].speaker, "Alice");
        assert_eq!(parsed.turns[0].text, "Hello there");
        assert_eq!(parsed.turns[1].speaker, "Bob");
        assert_eq!(parsed.turns[1].index, 1);
        assert!(parsed.turns[0].timestamp.is_none());
    }

    #[test]
    fn test_continuation_lines_join_current_turn() {
        let parsed = parse_turns("Alice: First part\nsecond part\n\nBob: Reply");
        assert_eq!(parsed.turns.len(), 2);
        assert_eq!(parsed.turns[0].text, "First part second part");
    }

    #[test]
    fn test_label_only_line_takes_following_text() {
        let parsed = parse_turns("Alice:\nI will send the deck");
        assert_eq!(parsed.turns.len(), 1);
        assert_eq!(parsed.turns[0].text, "I will send the deck");
    }

    #[test]
    fn test_preamble_lines_are_skipped() {
        let parsed = parse_turns("Weekly sync, 3 March\n\nAlice: Let's start");
        assert_eq!(parsed.skipped_lines, 1);
        assert_eq!(parsed.turns.len(), 1);
    }

    #[test]
    fn test_no_labels_yields_no_turns() {
        let parsed = parse_turns("just some notes\nwithout any speakers");
        assert!(parsed.turns.is_empty());
        assert_eq!(parsed.skipped_lines, 2);
    }

    #[test]
    fn test_empty_turns_dropped_and_reindexed() {
        let parsed = parse_turns("Alice:\nBob: Something");
        assert_eq!(parsed.turns.len(), 1);
        assert_eq!(parsed.turns[0].speaker, "Bob");
        assert_eq!(parsed.turns[0].index, 0);
    }

    #[test]
    fn test_multi_word_speaker_label() {
        let parsed = parse_turns("Speaker 2: Agreed");
        assert_eq!(parsed.turns[0].speaker, "Speaker 2");
    }

    #[rstest]
    #[case::sentence("The plan for the quarter: ship it.")]
    #[case::list_intro("We agreed on three things: a, b, c.")]
    fn test_prose_before_colon_is_not_a_label(#[case] line: &str) {
        let parsed = parse_turns(line);
        assert!(parsed.turns.is_empty(), "{line}");
        assert_eq!(parsed.skipped_lines, 1);
    }

    #[test]
    fn test_four_word_label_is_accepted() {
        let parsed = parse_turns("Dr. Mary Ann Smith: Welcome");
        assert_eq!(parsed.turns[0].speaker, "Dr. Mary Ann Smith");
    }

    #[rstest]
    #[case::bracketed("[00:01:05] Alice: Hi", 65.0)]
    #[case::bracketed_short("[02:30] Alice: Hi", 150.0)]
    #[case::bare("01:00:00 Alice: Hi", 3600.0)]
    #[case::parenthesised("Alice (00:00:42): Hi", 42.0)]
    fn test_timestamp_forms(#[case] line: &str, #[case] expected: f64) {
        let parsed = parse_turns(line);
        assert_eq!(parsed.turns.len(), 1);
        assert_eq!(parsed.turns[0].speaker, "Alice");
        assert_eq!(parsed.turns[0].text, "Hi");
        assert_relative_eq!(parsed.turns[0].timestamp.unwrap(), expected);
    }

    #[rstest]
    #[case("12:61")]
    #[case("aa:10")]
    #[case("1:2:3:4")]
    fn test_parse_timestamp_rejects_invalid(#[case] text: &str) {
        assert!(parse_timestamp(text).is_none());
    }

    #[test]
    fn test_render_round_trips_through_parser() {
        let turn = SpeakerTurn {
            index: 0,
            speaker: "Carol".to_string(),
            text: "Ship it Friday".to_string(),
            timestamp: Some(3725.0),
        };
        assert_eq!(turn.render(), "[01:02:05] Carol: Ship it Friday");
        let parsed = parse_turns(&turn.render());
        assert_eq!(parsed.turns[0], turn);
    }
}
