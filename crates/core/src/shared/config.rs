use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_VAGUE_DEADLINES};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Immutable settings for one pipeline run, threaded into every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub extraction: ExtractionConfig,
    pub aggregation: AggregationConfig,
    pub scoring: ScoringConfig,
    pub validation: ValidationConfig,
    /// Upper bound on extraction calls in flight at once.
    pub max_concurrent_extractions: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            extraction: ExtractionConfig::default(),
            aggregation: AggregationConfig::default(),
            scoring: ScoringConfig::default(),
            validation: ValidationConfig::default(),
            max_concurrent_extractions: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Hard cap on new (non-overlap) turns per chunk.
    pub max_turns: usize,
    /// Hard cap on the time span of a chunk, when the transcript is timestamped.
    pub max_duration_secs: Option<f64>,
    /// Characters of new content required before a speaker change may close a chunk.
    pub min_chars: usize,
    /// Trailing turns of the previous chunk repeated at the start of the next.
    pub overlap_turns: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_turns: 40,
            max_duration_secs: Some(180.0),
            min_chars: 1200,
            overlap_turns: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Retries after a malformed response, each with a stricter prompt.
    pub max_parse_retries: u32,
    /// Retries after a service failure before the run is aborted.
    pub max_service_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_parse_retries: 2,
            max_service_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

/// Which candidate wins an evenly split owner or deadline vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictTieBreak {
    EarliestChunk,
    LatestChunk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Minimum token-overlap similarity for two tasks to be the same item.
    pub similarity_threshold: f64,
    /// Similarity required to merge candidates whose owners disagree.
    pub conflict_similarity_threshold: f64,
    /// Maximum chunk-index distance between candidates that may merge.
    pub neighbor_window: usize,
    pub tie_break: ConflictTieBreak,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            conflict_similarity_threshold: 0.9,
            neighbor_window: 1,
            tie_break: ConflictTieBreak::EarliestChunk,
        }
    }
}

/// Weights of the three confidence signals.
///
/// Defaults sum to 1.0: agreement 0.4, completeness 0.35, extractor 0.25.
/// Overrides need not sum to 1.0; the weighted sum is clamped to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub agreement_weight: f64,
    pub completeness_weight: f64,
    pub extractor_weight: f64,
    /// Stand-in for the extractor signal when no candidate reported one.
    pub neutral_extractor_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            agreement_weight: 0.4,
            completeness_weight: 0.35,
            extractor_weight: 0.25,
            neutral_extractor_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousDeadlinePolicy {
    /// Keep the raw text and flag the item for review.
    Flag,
    /// Keep the raw text without flagging.
    Accept,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub confidence_threshold: f64,
    pub ambiguous_deadline_policy: AmbiguousDeadlinePolicy,
    /// Deadline phrases considered too vague to act on.
    pub vague_deadline_terms: Vec<String>,
    pub flag_vague_tasks: bool,
    pub flag_multiple_owners: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            ambiguous_deadline_policy: AmbiguousDeadlinePolicy::Flag,
            vague_deadline_terms: DEFAULT_VAGUE_DEADLINES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            flag_vague_tasks: true,
            flag_multiple_owners: true,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-user config location, e.g. `~/.config/Minutewise/config.json` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.chunking;
        if c.max_turns == 0 {
            return Err(invalid("chunking.max_turns must be at least 1"));
        }
        if c.overlap_turns >= c.max_turns {
            return Err(invalid(format!(
                "chunking.overlap_turns ({}) must be smaller than chunking.max_turns ({})",
                c.overlap_turns, c.max_turns
            )));
        }
        if let Some(d) = c.max_duration_secs {
            if d <= 0.0 {
                return Err(invalid(format!(
                    "chunking.max_duration_secs must be positive, got {d}"
                )));
            }
        }

        let e = &self.extraction;
        if e.initial_backoff_ms > e.max_backoff_ms {
            return Err(invalid("extraction.initial_backoff_ms exceeds max_backoff_ms"));
        }

        let a = &self.aggregation;
        check_unit("aggregation.similarity_threshold", a.similarity_threshold)?;
        check_unit(
            "aggregation.conflict_similarity_threshold",
            a.conflict_similarity_threshold,
        )?;
        if a.conflict_similarity_threshold < a.similarity_threshold {
            return Err(invalid(
                "aggregation.conflict_similarity_threshold must not be below similarity_threshold",
            ));
        }

        let s = &self.scoring;
        for (name, w) in [
            ("scoring.agreement_weight", s.agreement_weight),
            ("scoring.completeness_weight", s.completeness_weight),
            ("scoring.extractor_weight", s.extractor_weight),
        ] {
            if !(w.is_finite() && w >= 0.0) {
                return Err(invalid(format!("{name} must be non-negative, got {w}")));
            }
        }
        check_unit(
            "scoring.neutral_extractor_confidence",
            s.neutral_extractor_confidence,
        )?;

        check_unit(
            "validation.confidence_threshold",
            self.validation.confidence_threshold,
        )?;

        if self.max_concurrent_extractions == 0 {
            return Err(invalid("max_concurrent_extractions must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be between 0.0 and 1.0, got {value}")))
    }
}
