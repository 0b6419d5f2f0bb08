use crate::llm::ChatModel;
use crate::types::Article;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str =
    "You are a scientific paper ranker. Return only the numbers in order of relevance.";

/// Load the static preference-weight table: one `<topic...> <weight>`
/// rule per line, `#` comments and blank lines ignored, malformed
/// weights logged and skipped. An unreadable file degrades to an empty
/// table, which in turn degrades ranking to a noop.
pub fn load_weights(path: &Path) -> BTreeMap<String, i64> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("error loading preferences from {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    let mut weights = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((topic, raw_weight)) = line.rsplit_once(char::is_whitespace) else {
            warn!("invalid preference line: {line}");
            continue;
        };
        match raw_weight.parse::<i64>() {
            Ok(weight) => {
                weights.insert(topic.trim().to_string(), weight);
            }
            Err(_) => warn!("invalid weight in preferences: {line}"),
        }
    }
    weights
}

/// Reorders articles by how well they match the weight table, via one
/// model call. Any failure (request error, wrong index count, index out
/// of range, duplicate index) falls back to the original order; ranking
/// never drops or duplicates an article.
pub struct Ranker<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> Ranker<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    pub async fn rank(
        &self,
        articles: Vec<Article>,
        weights: &BTreeMap<String, i64>,
    ) -> Vec<Article> {
        if articles.len() < 2 {
            return articles;
        }
        if weights.is_empty() {
            info!("no preference weights loaded, keeping original order");
            return articles;
        }

        let prompt = ranking_prompt(&articles, weights);
        let response = match self.model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("error generating rankings: {}", e);
                return articles;
            }
        };

        match parse_ranking(&response, articles.len()) {
            Some(order) => {
                info!("ranked {} articles", articles.len());
                apply_order(articles, &order)
            }
            None => {
                warn!("incomplete rankings received, using original order");
                articles
            }
        }
    }
}

fn ranking_prompt(articles: &[Article], weights: &BTreeMap<String, i64>) -> String {
    let mut prompt = String::from(
        "Here are the user's research interests and their weights (1-10, higher is more important):\n",
    );
    for (topic, weight) in weights {
        let _ = writeln!(prompt, "{topic}: {weight}");
    }
    prompt.push_str(
        "\nPlease rank the following papers by how well they match these interests, \
         considering both the weights and the content. \
         Return only the numbers in order of relevance:\n\n",
    );
    for (i, article) in articles.iter().enumerate() {
        let _ = write!(
            prompt,
            "{}. Title: {}\n   DOI: {}\n   Abstract: {}\n   Summary: {}\n",
            i + 1,
            article.title,
            article.doi,
            article.abstract_text,
            article.summary.as_deref().unwrap_or(""),
        );
    }
    prompt
}

/// Parse whitespace-separated 1-based indices and validate that they
/// form a permutation of `1..=expected`.
fn parse_ranking(response: &str, expected: usize) -> Option<Vec<usize>> {
    let indices: Vec<usize> = response
        .split_whitespace()
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse().ok())
        .collect();

    if indices.len() != expected {
        return None;
    }
    let mut seen = vec![false; expected];
    for &index in &indices {
        if index < 1 || index > expected || seen[index - 1] {
            return None;
        }
        seen[index - 1] = true;
    }
    Some(indices)
}

fn apply_order(articles: Vec<Article>, order: &[usize]) -> Vec<Article> {
    let mut slots: Vec<Option<Article>> = articles.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|&index| slots[index - 1].take())
        .collect()
}
