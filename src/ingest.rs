use crate::extract::{extract_abstract, extract_date, extract_identifier, EntryFields};
use crate::types::{ArticleCandidate, DigestError, FeedSpec, Result};
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

const USER_AGENT: &str = "journal-digest/0.1";
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Outcome of one feed within a run. A failed feed never aborts its
/// siblings; the orchestrator only logs the reason.
#[derive(Debug)]
pub enum FeedOutcome {
    Fetched {
        journal: String,
        candidates: Vec<ArticleCandidate>,
    },
    Failed {
        journal: String,
        reason: String,
    },
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<FeedOutcome>,
}

impl IngestReport {
    pub fn feeds_ok(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FeedOutcome::Fetched { .. }))
            .count()
    }

    pub fn feeds_failed(&self) -> usize {
        self.outcomes.len() - self.feeds_ok()
    }

    pub fn into_candidates(self) -> Vec<ArticleCandidate> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o {
                FeedOutcome::Fetched { candidates, .. } => Some(candidates),
                FeedOutcome::Failed { .. } => None,
            })
            .flatten()
            .collect()
    }
}

/// Fetches the configured journal feeds and normalizes their entries
/// into article candidates. Normalization only; recency filtering is the
/// orchestrator's job.
pub struct FeedIngestor {
    client: Client,
}

impl FeedIngestor {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    pub async fn ingest(&self, feeds: &[FeedSpec]) -> IngestReport {
        let mut report = IngestReport::default();
        for feed in feeds {
            match self.ingest_feed(feed).await {
                Ok(candidates) => {
                    info!(
                        "fetched {}: {} candidates",
                        feed.journal,
                        candidates.len()
                    );
                    report.outcomes.push(FeedOutcome::Fetched {
                        journal: feed.journal.clone(),
                        candidates,
                    });
                }
                Err(e) => {
                    error!("error fetching feed {}: {}", feed.journal, e);
                    report.outcomes.push(FeedOutcome::Failed {
                        journal: feed.journal.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn ingest_feed(&self, feed: &FeedSpec) -> Result<Vec<ArticleCandidate>> {
        debug!("fetching feed: {} ({})", feed.journal, feed.url);
        let response = self.client.get(&feed.url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        let parsed = parser::parse(body.as_ref())
            .map_err(|e| DigestError::Parse(format!("{}: {}", feed.journal, e)))?;

        let candidates = parsed
            .entries
            .into_iter()
            .map(|entry| normalize_entry(EntryFields::from_feed(entry), feed))
            .collect();
        Ok(candidates)
    }
}

impl Default for FeedIngestor {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a candidate from a normalized entry view. The extraction chains
/// guarantee an identifier and a date for every entry, so this never
/// drops one.
fn normalize_entry(fields: EntryFields, feed: &FeedSpec) -> ArticleCandidate {
    let doi = extract_identifier(&fields);
    let published_at = extract_date(&fields);
    let abstract_text = extract_abstract(&fields);
    ArticleCandidate {
        doi,
        title: fields.title.unwrap_or_else(|| "No Title".to_string()),
        journal: feed.journal.clone(),
        link: fields.link.unwrap_or_default(),
        abstract_text,
        impact_factor: feed.impact_factor,
        published_at,
    }
}
