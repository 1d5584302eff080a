use std::collections::BTreeSet;

/// Function words ignored when comparing task descriptions.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "for", "on", "in", "at", "by", "with", "and", "or", "our",
    "your", "their", "his", "her", "its", "my", "we", "i", "you", "will", "should", "please",
    "be", "is", "are", "this", "that", "it", "up",
];

/// Lowercases, strips punctuation and collapses whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Precomputed comparison form of a task description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFingerprint {
    normalized: String,
    tokens: BTreeSet<String>,
}

impl TaskFingerprint {
    pub fn new(text: &str) -> Self {
        let normalized = normalize(text);
        let tokens = normalized
            .split(' ')
            .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
            .map(|t| t.trim_matches('\'').to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self { normalized, tokens }
    }

    /// Content tokens: normalized words minus stopwords.
    pub fn tokens(&self) -> &BTreeSet<String> {
        &self.tokens
    }

    /// Jaccard overlap of content tokens, in [0, 1].
    ///
    /// Texts made only of stopwords fall back to exact normalized equality.
    pub fn similarity(&self, other: &TaskFingerprint) -> f64 {
        if self.tokens.is_empty() || other.tokens.is_empty() {
            let same = !self.normalized.is_empty() && self.normalized == other.normalized;
            return if same { 1.0 } else { 0.0 };
        }
        let shared = self.tokens.intersection(&other.tokens).count();
        let union = self.tokens.union(&other.tokens).count();
        shared as f64 / union as f64
    }
}
