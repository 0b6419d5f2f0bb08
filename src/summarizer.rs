use crate::llm::ChatModel;
use crate::types::Article;
use std::fmt::Write;
use tracing::{info, warn};

pub const SUMMARY_BATCH_SIZE: usize = 5;
pub const FAILED_SUMMARY_MARKER: &str = "Summary generation failed.";

const SYSTEM_PROMPT: &str =
    "You are a scientific paper summarizer. Provide clear, concise summaries.";

/// Attaches model-generated summaries to articles in fixed-size batches,
/// one request per batch, strictly sequentially. Never fails: a batch
/// whose request errors gets the failure marker on every article in it,
/// and the remaining batches proceed untouched.
pub struct BatchSummarizer<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> BatchSummarizer<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    pub async fn summarize(&self, articles: &mut [Article]) {
        if articles.is_empty() {
            warn!("no articles to summarize");
            return;
        }
        for batch in articles.chunks_mut(SUMMARY_BATCH_SIZE) {
            self.summarize_batch(batch).await;
        }
        let summarized = articles.iter().filter(|a| a.summary.is_some()).count();
        info!("summarized {}/{} articles", summarized, articles.len());
    }

    async fn summarize_batch(&self, batch: &mut [Article]) {
        let prompt = batch_prompt(batch);
        match self.model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => {
                let summaries = split_summaries(&response);
                if summaries.len() < batch.len() {
                    warn!(
                        "model returned {} summaries for a batch of {}",
                        summaries.len(),
                        batch.len()
                    );
                }
                // Positional zip; a short response leaves trailing
                // articles without a summary.
                for (article, summary) in batch.iter_mut().zip(summaries) {
                    article.summary = Some(summary);
                }
            }
            Err(e) => {
                warn!("batch summarization failed: {}", e);
                for article in batch.iter_mut() {
                    article.summary = Some(FAILED_SUMMARY_MARKER.to_string());
                }
            }
        }
    }
}

fn batch_prompt(batch: &[Article]) -> String {
    let mut prompt = String::from(
        "For each of the following abstracts, write a concise two-sentence summary. \
         The first sentence should describe the main discovery, the second its significance. \
         Return the summaries in the same order, separated by a blank line, \
         with no numbering or other text.\n\n",
    );
    for (i, article) in batch.iter().enumerate() {
        let _ = write!(
            prompt,
            "Abstract {}:\nTitle: {}\n{}\n\n",
            i + 1,
            article.title,
            article.abstract_text
        );
    }
    prompt
}

fn split_summaries(response: &str) -> Vec<String> {
    response
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
