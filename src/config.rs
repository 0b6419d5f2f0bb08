use crate::types::{DigestError, FeedSpec, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_SHORTLIST: usize = 10;

/// Credentials and endpoint for the chat-completions service. A missing
/// API key is a fatal precondition: the run aborts before any stage
/// touches the store.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl ModelConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| DigestError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        let base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Ok(Self {
            api_key,
            model,
            base_url,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub feeds: Vec<FeedSpec>,
    pub preferences_file: PathBuf,
    pub database_url: String,
    pub window_days: i64,
    pub shortlist: usize,
    pub model: ModelConfig,
}

impl Config {
    /// The stock journal set, with impact factors used for shortlisting.
    pub fn default_feeds() -> Vec<FeedSpec> {
        [
            (
                "Nature Reviews Drug Discovery",
                "https://www.nature.com/nrd/current_issue/rss",
                122.7,
            ),
            (
                "Nature Reviews Cancer",
                "https://www.nature.com/nrc/current_issue/rss",
                78.5,
            ),
            (
                "Nature Biomedical Engineering",
                "https://www.nature.com/natbiomedeng/current_issue/rss",
                28.1,
            ),
            (
                "Nature Biotechnology",
                "https://www.nature.com/nbt/current_issue/rss",
                46.9,
            ),
            (
                "Nature Genetics",
                "https://www.nature.com/ng/current_issue/rss",
                31.7,
            ),
            ("Nature", "https://www.nature.com/nature/current_issue/rss", 50.5),
        ]
        .into_iter()
        .map(|(journal, url, impact_factor)| FeedSpec {
            journal: journal.to_string(),
            url: url.to_string(),
            impact_factor,
        })
        .collect()
    }
}
