use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A journal feed to poll, with the static weight applied when shortlisting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSpec {
    pub journal: String,
    pub url: String,
    pub impact_factor: f64,
}

/// A normalized entry produced by the ingestor, not yet deduplicated
/// against the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub doi: String,
    pub title: String,
    pub journal: String,
    pub link: String,
    pub abstract_text: String,
    pub impact_factor: f64,
    pub published_at: DateTime<Utc>,
}

/// A persisted article, keyed by DOI. The DOI never changes once stored;
/// only `summary` is mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub doi: String,
    pub title: String,
    pub journal: String,
    pub link: String,
    pub abstract_text: String,
    pub impact_factor: f64,
    pub published_at: DateTime<Utc>,
    pub summary: Option<String>,
}

impl From<ArticleCandidate> for Article {
    fn from(candidate: ArticleCandidate) -> Self {
        Self {
            doi: candidate.doi,
            title: candidate.title,
            journal: candidate.journal,
            link: candidate.link,
            abstract_text: candidate.abstract_text,
            impact_factor: candidate.impact_factor,
            published_at: candidate.published_at,
            summary: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotePolarity {
    Up,
    Down,
}

impl VotePolarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotePolarity::Up => "up",
            VotePolarity::Down => "down",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "up" => Ok(VotePolarity::Up),
            "down" => Ok(VotePolarity::Down),
            other => Err(DigestError::Parse(format!("unknown vote polarity: {other}"))),
        }
    }
}

/// A feedback vote recorded by the front-end collaborator. `consumed`
/// transitions false -> true exactly once, when the preference learner
/// folds the vote into the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub doi: String,
    pub polarity: VotePolarity,
    pub cast_at: DateTime<Utc>,
    pub consumed: bool,
}

/// The per-date digest snapshot. At most one exists per calendar date;
/// re-assembly replaces the article set wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub dois: Vec<String>,
    pub highlight: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("model error: {0}")]
    Model(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DigestError>;
