pub mod chunker;
pub mod speaker_turn;
pub mod transcript_chunk;
