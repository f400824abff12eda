pub mod caption;
pub mod completion;
pub mod embeddings;
pub mod transcription;
