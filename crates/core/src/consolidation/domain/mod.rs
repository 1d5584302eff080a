pub mod aggregator;
pub mod confidence_scorer;
pub mod consolidated_item;
pub mod deadline;
pub mod text_similarity;
