pub mod consolidation;
pub mod extraction;
pub mod pipeline;
pub mod shared;
pub mod transcript;
pub mod validation;
