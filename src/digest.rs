use crate::store::Store;
use crate::types::{Article, DigestRecord, Result};
use chrono::NaiveDate;
use tracing::info;

/// Builds the per-date digest snapshot. Re-assembly for a date that
/// already has one replaces it in full; the final state depends only on
/// the latest run's input set.
pub struct DigestAssembler<'a> {
    store: &'a Store,
}

impl<'a> DigestAssembler<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub async fn assemble(
        &self,
        date: NaiveDate,
        articles: &[Article],
        highlight: Option<&str>,
    ) -> Result<DigestRecord> {
        let dois: Vec<String> = articles.iter().map(|a| a.doi.clone()).collect();
        let digest = self.store.replace_digest(date, &dois, highlight).await?;
        info!("assembled digest for {} with {} articles", date, dois.len());
        Ok(digest)
    }
}
