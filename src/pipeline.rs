use crate::config::Config;
use crate::digest::DigestAssembler;
use crate::highlight::HighlightSelector;
use crate::ingest::FeedIngestor;
use crate::llm::ChatModel;
use crate::preferences::PreferenceLearner;
use crate::ranker::{load_weights, Ranker};
use crate::store::Store;
use crate::summarizer::BatchSummarizer;
use crate::types::{Article, Result};
use chrono::{Duration, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a run accomplished, for the caller to log.
#[derive(Debug)]
pub struct RunReport {
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub candidates: usize,
    pub shortlisted: usize,
    pub digest_date: Option<NaiveDate>,
    pub highlight: Option<String>,
}

/// Runs the whole batch, one stage after another: ingest, persist,
/// shortlist, summarize, learn preferences, rank, highlight, assemble.
/// Each stage sees only the previous stage's output, and a failure
/// inside one feed, batch or article degrades that unit alone.
pub struct DigestPipeline {
    config: Config,
    store: Store,
    model: Arc<dyn ChatModel>,
    ingestor: FeedIngestor,
}

impl DigestPipeline {
    pub fn new(config: Config, store: Store, model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            store,
            model,
            ingestor: FeedIngestor::new(),
        }
    }

    pub async fn run(&self, date: NaiveDate) -> Result<RunReport> {
        info!("starting digest run for {}", date);

        let report = self.ingestor.ingest(&self.config.feeds).await;
        let feeds_ok = report.feeds_ok();
        let feeds_failed = report.feeds_failed();
        let candidates = report.into_candidates();
        let candidate_count = candidates.len();
        info!(
            "ingested {} candidates from {} feeds ({} failed)",
            candidate_count, feeds_ok, feeds_failed
        );

        let articles = self.persist_candidates(candidates).await;
        let mut shortlist = self.shortlist(articles);
        let shortlisted = shortlist.len();

        if shortlist.is_empty() {
            info!("no recent articles; skipping digest for {}", date);
            return Ok(RunReport {
                feeds_ok,
                feeds_failed,
                candidates: candidate_count,
                shortlisted: 0,
                digest_date: None,
                highlight: None,
            });
        }

        BatchSummarizer::new(self.model.as_ref())
            .summarize(&mut shortlist)
            .await;
        for article in &shortlist {
            if let Some(summary) = &article.summary {
                self.store.set_summary(&article.doi, summary).await?;
            }
        }

        // A learner failure only means ranking runs with the previous
        // profile; the digest still goes out.
        match PreferenceLearner::new(&self.store, self.model.as_ref())
            .update()
            .await
        {
            Ok(Some(_)) => info!("preference profile refreshed"),
            Ok(None) => debug!("no new feedback votes"),
            Err(e) => warn!("preference update failed: {}", e),
        }

        let weights = load_weights(&self.config.preferences_file);
        let shortlist = Ranker::new(self.model.as_ref())
            .rank(shortlist, &weights)
            .await;

        let profile = self.store.profile_text().await?.unwrap_or_default();
        let highlight = HighlightSelector::new(self.model.as_ref())
            .select(&shortlist, &profile)
            .await
            .and_then(|h| h.doi);

        let digest = DigestAssembler::new(&self.store)
            .assemble(date, &shortlist, highlight.as_deref())
            .await?;
        info!(
            "digest for {} assembled with {} articles",
            date,
            digest.dois.len()
        );

        Ok(RunReport {
            feeds_ok,
            feeds_failed,
            candidates: candidate_count,
            shortlisted,
            digest_date: Some(date),
            highlight,
        })
    }

    /// Upsert every candidate, deduplicating within the run; a failed
    /// upsert skips that candidate only.
    async fn persist_candidates(
        &self,
        candidates: Vec<crate::types::ArticleCandidate>,
    ) -> Vec<Article> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut articles = Vec::new();
        for candidate in candidates {
            if !seen.insert(candidate.doi.clone()) {
                debug!("duplicate candidate in run: {}", candidate.doi);
                continue;
            }
            match self.store.upsert_article(&candidate).await {
                Ok(article) => articles.push(article),
                Err(e) => warn!("failed to persist {}: {}", candidate.doi, e),
            }
        }
        articles
    }

    /// Keep articles published within the recency window, highest
    /// impact factor first, bounded by the shortlist size.
    fn shortlist(&self, articles: Vec<Article>) -> Vec<Article> {
        let cutoff = Utc::now() - Duration::days(self.config.window_days);
        let mut recent: Vec<Article> = articles
            .into_iter()
            .filter(|a| a.published_at >= cutoff)
            .collect();
        recent.sort_by(|a, b| {
            b.impact_factor
                .partial_cmp(&a.impact_factor)
                .unwrap_or(Ordering::Equal)
        });
        recent.truncate(self.config.shortlist);
        recent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, DEFAULT_SHORTLIST, DEFAULT_WINDOW_DAYS};
    use crate::llm::ScriptedModel;
    use crate::types::ArticleCandidate;
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            feeds: Vec::new(),
            preferences_file: PathBuf::from("/nonexistent/preferences.txt"),
            database_url: "sqlite::memory:".to_string(),
            window_days: DEFAULT_WINDOW_DAYS,
            shortlist: DEFAULT_SHORTLIST,
            model: ModelConfig {
                api_key: "test".to_string(),
                model: "test-model".to_string(),
                base_url: "http://localhost".to_string(),
            },
        }
    }

    fn candidate(doi: &str, impact_factor: f64, age_days: i64) -> ArticleCandidate {
        ArticleCandidate {
            doi: doi.to_string(),
            title: doi.to_string(),
            journal: "Nature".to_string(),
            link: String::new(),
            abstract_text: "An abstract.".to_string(),
            impact_factor,
            published_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn run_without_feeds_writes_no_digest() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let pipeline = DigestPipeline::new(config(), store, Arc::new(ScriptedModel::new()));

        let report = pipeline.run(Utc::now().date_naive()).await.unwrap();

        assert_eq!(report.candidates, 0);
        assert_eq!(report.digest_date, None);
    }

    #[tokio::test]
    async fn shortlist_filters_by_recency_and_sorts_by_impact() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let mut cfg = config();
        cfg.shortlist = 2;
        let pipeline = DigestPipeline::new(cfg, store, Arc::new(ScriptedModel::new()));

        let articles = pipeline
            .persist_candidates(vec![
                candidate("10.1038/old", 99.0, 30),
                candidate("10.1038/mid", 40.0, 2),
                candidate("10.1038/top", 80.0, 1),
                candidate("10.1038/low", 10.0, 3),
            ])
            .await;
        let shortlist = pipeline.shortlist(articles);

        let dois: Vec<&str> = shortlist.iter().map(|a| a.doi.as_str()).collect();
        assert_eq!(dois, vec!["10.1038/top", "10.1038/mid"]);
    }

    #[tokio::test]
    async fn duplicate_candidates_within_a_run_collapse() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let pipeline = DigestPipeline::new(config(), store, Arc::new(ScriptedModel::new()));

        let articles = pipeline
            .persist_candidates(vec![
                candidate("10.1038/a", 50.0, 1),
                candidate("10.1038/a", 50.0, 1),
            ])
            .await;
        assert_eq!(articles.len(), 1);
    }
}
