pub mod config;
pub mod digest;
pub mod extract;
pub mod highlight;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod preferences;
pub mod ranker;
pub mod store;
pub mod summarizer;
pub mod types;

pub use config::{Config, ModelConfig};
pub use digest::DigestAssembler;
pub use highlight::{Highlight, HighlightSelector};
pub use ingest::{FeedIngestor, FeedOutcome, IngestReport};
pub use llm::{ChatModel, OpenAiClient, ScriptedModel};
pub use pipeline::{DigestPipeline, RunReport};
pub use preferences::PreferenceLearner;
pub use ranker::{load_weights, Ranker};
pub use store::Store;
pub use summarizer::{BatchSummarizer, FAILED_SUMMARY_MARKER, SUMMARY_BATCH_SIZE};
pub use types::*;
