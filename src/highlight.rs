use crate::llm::ChatModel;
use crate::types::Article;
use std::fmt::Write;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You are an expert at matching articles to user preferences.";

/// The model's pick for the editorial highlight. `doi` is set only when
/// the returned title matches a known article; an unmatched title is
/// kept for logging but marks nothing downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub title: String,
    pub justification: String,
    pub doi: Option<String>,
}

/// Picks exactly one article as the highlight, guided by the preference
/// profile. A model failure yields no highlight, never an error.
pub struct HighlightSelector<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> HighlightSelector<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    pub async fn select(&self, articles: &[Article], profile: &str) -> Option<Highlight> {
        if articles.is_empty() {
            return None;
        }

        let prompt = highlight_prompt(articles, profile);
        let response = match self.model.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("error selecting highlight: {}", e);
                return None;
            }
        };

        let (title, justification) = parse_highlight(&response);
        let doi = articles
            .iter()
            .find(|a| a.title.trim() == title.trim())
            .map(|a| a.doi.clone());
        if doi.is_none() {
            warn!("highlighted title matches no known article: {title:?}");
        } else {
            info!("selected highlight: {title}");
        }
        Some(Highlight {
            title,
            justification,
            doi,
        })
    }
}

fn highlight_prompt(articles: &[Article], profile: &str) -> String {
    let mut prompt = format!(
        "Users like articles with these properties:\n{profile}\n\nHere are today's articles:\n"
    );
    for (i, article) in articles.iter().enumerate() {
        let _ = write!(
            prompt,
            "Paper {}:\nTitle: {}\nAbstract: {}\n\n",
            i + 1,
            article.title,
            article.abstract_text
        );
    }
    prompt.push_str(
        "Pick the one article from the list above that users are most likely to upvote, \
         based on their preferences. Return the title of the highlighted article and a \
         short justification. Format as:\nTITLE: ...\nJUSTIFICATION: ...\n",
    );
    prompt
}

/// Missing prefix lines parse to empty strings.
fn parse_highlight(response: &str) -> (String, String) {
    let mut title = String::new();
    let mut justification = String::new();
    for line in response.lines() {
        if let Some(rest) = line.strip_prefix("TITLE:") {
            title = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("JUSTIFICATION:") {
            justification = rest.trim().to_string();
        }
    }
    (title, justification)
}
