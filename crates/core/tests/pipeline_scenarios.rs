use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use rstest::rstest;

use minutewise_core::consolidation::domain::aggregator::Aggregator;
use minutewise_core::consolidation::domain::confidence_scorer::ConfidenceScorer;
use minutewise_core::consolidation::domain::consolidated_item::ConsolidatedItem;
use minutewise_core::extraction::domain::extraction_prompt::ExtractionPrompt;
use minutewise_core::extraction::domain::extractor_adapter::ExtractionError;
use minutewise_core::extraction::domain::raw_candidate::RawCandidate;
use minutewise_core::extraction::domain::understanding_service::{
    ServiceError, UnderstandingService,
};
use minutewise_core::pipeline::extract_action_items_use_case::{
    ExtractActionItemsUseCase, ExtractionReport, PipelineError,
};
use minutewise_core::pipeline::infrastructure::threaded_map_executor::ThreadedMapExecutor;
use minutewise_core::pipeline::pipeline_logger::NullPipelineLogger;
use minutewise_core::shared::config::{AggregationConfig, PipelineConfig, ScoringConfig};
use minutewise_core::validation::domain::validation_result::{ValidationReason, ValidationStatus};

// --- Stubs ---

/// Answers each chunk with a fixed response, `[]` for unlisted chunks.
struct PerChunkService {
    responses: HashMap<usize, Result<String, ServiceError>>,
    delays: HashMap<usize, Duration>,
}

impl PerChunkService {
    fn new(responses: Vec<(usize, &str)>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|(i, r)| (i, Ok(r.to_string())))
                .collect(),
            delays: HashMap::new(),
        }
    }

    fn failing_on(mut self, chunk: usize) -> Self {
        self.responses.insert(
            chunk,
            Err(ServiceError::Rejected {
                status: 403,
                message: "forbidden".to_string(),
            }),
        );
        self
    }

    fn with_delay(mut self, chunk: usize, ms: u64) -> Self {
        self.delays.insert(chunk, Duration::from_millis(ms));
        self
    }
}

impl UnderstandingService for PerChunkService {
    fn complete(&self, prompt: &ExtractionPrompt) -> Result<String, ServiceError> {
        if let Some(delay) = self.delays.get(&prompt.chunk_index) {
            std::thread::sleep(*delay);
        }
        self.responses
            .get(&prompt.chunk_index)
            .cloned()
            .unwrap_or_else(|| Ok("[]".to_string()))
    }
}

// --- Helpers ---

const TWO_CHUNK_TRANSCRIPT: &str = "\
Alice: Thanks everyone for joining today.
Bob: Let's go over the open items.
Alice: I'll send the report by Friday.
Bob: Great, the report by Friday then.";

const FOUR_CHUNK_TRANSCRIPT: &str = "\
Alice: Kickoff.
Bob: Budget first.
Carol: Then hiring.
Dan: Then the venue.
Alice: Any blockers?
Bob: None from me.
Carol: None here.
Dan: All good.";

/// Two new turns per chunk, one turn of overlap, no time or size splits.
fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.chunking.max_turns = 2;
    config.chunking.overlap_turns = 1;
    config.chunking.max_duration_secs = None;
    config.extraction.initial_backoff_ms = 0;
    config.extraction.max_backoff_ms = 0;
    config
}

fn run_with(
    service: PerChunkService,
    transcript: &str,
    config: PipelineConfig,
) -> Result<ExtractionReport, PipelineError> {
    ExtractActionItemsUseCase::new(
        Arc::new(service),
        Box::new(ThreadedMapExecutor::new()),
        config,
        Box::new(NullPipelineLogger),
        None,
        None,
    )
    .run(transcript, "meeting.txt")
}

fn run(service: PerChunkService, transcript: &str) -> ExtractionReport {
    run_with(service, transcript, config()).unwrap()
}

// --- Scenarios ---

#[test]
fn test_overlapping_duplicates_merge_and_are_accepted() {
    let service = PerChunkService::new(vec![
        (0, r#"[{"task": "Send report", "owner": "Alice", "deadline": "Friday"}]"#),
        (1, r#"[{"task": "Send the report", "owner": null, "deadline": "Friday"}]"#),
    ]);
    let report = run(service, TWO_CHUNK_TRANSCRIPT);

    assert_eq!(report.chunk_count, 2);
    assert_eq!(report.candidate_count, 2);
    assert_eq!(report.items.len(), 1);

    let result = &report.items[0];
    let item = &result.scored.item;
    assert_eq!(item.owner.as_deref(), Some("Alice"));
    assert_eq!(item.merge_count, 2);
    assert_eq!(item.deadline.as_ref().map(|d| d.text()), Some("Friday"));
    assert_eq!(result.status, ValidationStatus::Accepted);
    assert!(result.reasons.is_empty());
    assert_relative_eq!(result.confidence(), 0.875);
}

#[test]
fn test_empty_task_is_dropped_into_discard_log() {
    let service = PerChunkService::new(vec![(0, r#"[{"task": "", "owner": "Bob", "deadline": null}]"#)]);
    let report = run(service, "Bob: I'll take care of it.");

    assert!(report.items.is_empty());
    assert_eq!(report.discards.count, 1);
    assert_eq!(report.discards.reasons[&ValidationReason::EmptyTask], 1);
    assert_eq!(report.discarded[0].owner.as_deref(), Some("Bob"));
}

#[test]
fn test_missing_owner_and_vague_deadline_are_flagged() {
    let service = PerChunkService::new(vec![(
        0,
        r#"[{"task": "Send the report", "owner": null, "deadline": "soon"}]"#,
    )]);
    let report = run(service, "Alice: Someone should send the report soon.");

    assert_eq!(report.items.len(), 1);
    let result = &report.items[0];
    assert_eq!(result.status, ValidationStatus::Flagged);
    assert_eq!(
        result.reasons,
        vec![
            ValidationReason::MissingOwner,
            ValidationReason::AmbiguousDeadline
        ]
    );
    assert_eq!(
        result.scored.item.deadline.as_ref().map(|d| d.raw.as_str()),
        Some("soon")
    );
}

#[test]
fn test_split_owner_vote_resolves_to_earliest_and_flags() {
    let service = PerChunkService::new(vec![
        (0, r#"[{"task": "Update the roadmap", "owner": "Alice"}]"#),
        (1, r#"[{"task": "Update the roadmap", "owner": "Carol"}]"#),
    ]);
    let report = run(service, TWO_CHUNK_TRANSCRIPT);

    assert_eq!(report.items.len(), 1);
    let result = &report.items[0];
    assert_eq!(result.scored.item.owner.as_deref(), Some("Alice"));
    assert_eq!(result.status, ValidationStatus::Flagged);
    assert!(result.reasons.contains(&ValidationReason::MergeConflict));
}

#[test]
fn test_no_candidates_is_an_empty_report() {
    let report = run(PerChunkService::new(vec![]), FOUR_CHUNK_TRANSCRIPT);

    assert_eq!(report.chunk_count, 4);
    assert_eq!(report.candidate_count, 0);
    assert!(report.items.is_empty());
    assert_eq!(report.discards.count, 0);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_malformed_chunk_degrades_without_failing_run() {
    let service = PerChunkService::new(vec![
        (0, "Sorry, I can't help with that."),
        (2, r#"{"action_items": [{"task": "Book the venue", "owner": "Dan", "deadline": "2025-03-01"}]}"#),
    ]);
    let report = run(service, FOUR_CHUNK_TRANSCRIPT);

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].chunk_index, 0);
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].task(), "Book the venue");
    assert_eq!(
        report.items[0].scored.item.deadline.as_ref().map(|d| d.text()),
        Some("2025-03-01")
    );
}

#[test]
fn test_exhausted_service_aborts_whole_run() {
    let service = PerChunkService::new(vec![(
        0,
        r#"[{"task": "Send report", "owner": "Alice"}]"#,
    )])
    .failing_on(2);
    let err = run_with(service, FOUR_CHUNK_TRANSCRIPT, config()).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Extraction(ExtractionError::ServiceExhausted { chunk_index: 2, .. })
    ));
}

#[test]
fn test_malformed_transcript_fails_before_extraction() {
    let err = run_with(
        PerChunkService::new(vec![]),
        "just some notes\nwithout speakers",
        config(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Format(_)));
}

#[rstest]
#[case(1)]
#[case(4)]
fn test_result_independent_of_completion_order(#[case] concurrency: usize) {
    let responses = vec![
        (0, r#"[{"task": "Draft the budget", "owner": "Bob"}]"#),
        (1, r#"[{"task": "Draft budget", "owner": "Bob", "deadline": "Monday"}]"#),
        (2, r#"[{"task": "Open two hiring reqs", "owner": "Carol"}]"#),
        (3, r#"[{"task": "Book the venue", "owner": "Dan"}]"#),
    ];
    // Early chunks finish last.
    let slow_first = PerChunkService::new(responses.clone())
        .with_delay(0, 40)
        .with_delay(1, 20);
    let sequential = PerChunkService::new(responses);

    let mut concurrent_config = config();
    concurrent_config.max_concurrent_extractions = concurrency;
    let mut sequential_config = config();
    sequential_config.max_concurrent_extractions = 1;

    let concurrent = run_with(slow_first, FOUR_CHUNK_TRANSCRIPT, concurrent_config).unwrap();
    let baseline = run_with(sequential, FOUR_CHUNK_TRANSCRIPT, sequential_config).unwrap();

    assert_eq!(concurrent.items, baseline.items);
    assert_eq!(concurrent.items.len(), 3);
    assert_eq!(concurrent.items[0].task(), "Draft the budget");
}

// --- Properties ---

fn noisy_candidates() -> Vec<RawCandidate> {
    vec![
        RawCandidate::new("Send the report", 0).with_owner("Alice"),
        RawCandidate::new("", 0).with_owner("Bob"),
        RawCandidate::new("Send report", 1).with_deadline("Friday"),
        RawCandidate::new("Book venue", 1).with_owner("Dan"),
        RawCandidate::new("Book the venue", 2).with_owner("Dana"),
        RawCandidate::new("   ", 2),
        RawCandidate::new("Review hiring plan", 3).with_confidence(0.9),
        RawCandidate::new("Send report", 3).with_owner("Alice"),
    ]
}

#[test]
fn test_every_candidate_is_merged_or_discarded() {
    let candidates = noisy_candidates();
    let result = Aggregator::consolidate(&candidates, &AggregationConfig::default());

    assert_eq!(result.accounted_candidates(), candidates.len());
    assert_eq!(result.empty_tasks.len(), 2);
}

#[test]
fn test_aggregation_is_repeatable() {
    let candidates = noisy_candidates();
    let config = AggregationConfig::default();
    let first = Aggregator::consolidate(&candidates, &config);
    let second = Aggregator::consolidate(&candidates, &config);
    assert_eq!(first, second);
}

#[test]
fn test_consolidated_output_is_stable_when_fed_back() {
    let config = AggregationConfig::default();
    let first = Aggregator::consolidate(&noisy_candidates(), &config);

    let fed_back: Vec<RawCandidate> = first
        .items
        .iter()
        .map(|item| {
            let mut c = RawCandidate::new(item.task.clone(), item.first_chunk().unwrap_or(0));
            c.owner = item.owner.clone();
            c.deadline = item.deadline.as_ref().map(|d| d.raw.clone());
            c
        })
        .collect();
    let second = Aggregator::consolidate(&fed_back, &config);

    let tasks = |items: &[ConsolidatedItem]| items.iter().map(|i| i.task.clone()).collect::<Vec<_>>();
    assert_eq!(tasks(&first.items), tasks(&second.items));
}

#[test]
fn test_more_agreement_never_lowers_score() {
    let config = AggregationConfig::default();
    let once = Aggregator::consolidate(&[RawCandidate::new("Send report", 1)], &config);
    let twice = Aggregator::consolidate(
        &[
            RawCandidate::new("Send report", 1),
            RawCandidate::new("Send the report", 2),
        ],
        &config,
    );

    let scorer = ConfidenceScorer::new(4, 1);
    let scoring = ScoringConfig::default();
    let single = scorer.score(once.items[0].clone(), &scoring);
    let double = scorer.score(twice.items[0].clone(), &scoring);
    assert!(double.confidence >= single.confidence);
    assert!(double.confidence <= 1.0 && single.confidence >= 0.0);
}
