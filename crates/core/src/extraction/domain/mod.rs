pub mod extraction_prompt;
pub mod extractor_adapter;
pub mod raw_candidate;
pub mod response_schema;
pub mod understanding_service;
