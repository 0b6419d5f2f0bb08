use crate::llm::ChatModel;
use crate::store::Store;
use crate::types::{Result, Vote, VotePolarity};
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str =
    "You are an expert at summarizing user preferences for scientific articles.";

/// Folds unconsumed feedback votes into the single evolving preference
/// profile. The profile is replaced, not appended; the votes it was
/// built from are marked consumed in the same transaction.
pub struct PreferenceLearner<'a> {
    store: &'a Store,
    model: &'a dyn ChatModel,
}

impl<'a> PreferenceLearner<'a> {
    pub fn new(store: &'a Store, model: &'a dyn ChatModel) -> Self {
        Self { store, model }
    }

    /// Returns `Ok(None)` when there is nothing new to learn from, with
    /// no mutation at all. A model failure leaves votes and profile
    /// untouched.
    pub async fn update(&self) -> Result<Option<String>> {
        let votes = self.store.unconsumed_votes().await?;
        if votes.is_empty() {
            debug!("no unconsumed votes; preference profile unchanged");
            return Ok(None);
        }

        let upvoted = self.abstracts_for(&votes, VotePolarity::Up).await?;
        let downvoted = self.abstracts_for(&votes, VotePolarity::Down).await?;
        let previous = self.store.profile_text().await?.unwrap_or_default();

        let prompt = update_prompt(&previous, &upvoted, &downvoted);
        let profile = self.model.complete(SYSTEM_PROMPT, &prompt).await?;

        let vote_ids: Vec<i64> = votes.iter().map(|v| v.id).collect();
        self.store
            .replace_profile_and_consume(&profile, &vote_ids)
            .await?;
        info!("preference profile updated from {} votes", vote_ids.len());
        Ok(Some(profile))
    }

    async fn abstracts_for(
        &self,
        votes: &[Vote],
        polarity: VotePolarity,
    ) -> Result<Vec<String>> {
        let mut abstracts = Vec::new();
        for vote in votes.iter().filter(|v| v.polarity == polarity) {
            match self.store.get_article(&vote.doi).await? {
                Some(article) => abstracts.push(article.abstract_text),
                None => warn!("vote references unknown article: {}", vote.doi),
            }
        }
        Ok(abstracts)
    }
}

fn update_prompt(previous: &str, upvoted: &[String], downvoted: &[String]) -> String {
    format!(
        "You are an expert at analyzing user preferences for scientific articles.\n\
         Here is the current summary of what users like and dislike:\n\
         {previous}\n\n\
         Here are new articles users upvoted:\n{}\n\n\
         Here are new articles users downvoted:\n{}\n\n\
         Update the summary of what users like and dislike in scientific articles. \
         Be concise and specific. Format as:\nLIKES: ...\nDISLIKES: ...\n",
        upvoted.join("\n"),
        downvoted.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::types::ArticleCandidate;
    use chrono::Utc;

    async fn store_with_articles() -> Store {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        for (doi, abstract_text) in [
            ("10.1038/a", "Abstract about genomics."),
            ("10.1038/b", "Abstract about oncology."),
        ] {
            store
                .upsert_article(&ArticleCandidate {
                    doi: doi.to_string(),
                    title: doi.to_string(),
                    journal: "Nature".to_string(),
                    link: String::new(),
                    abstract_text: abstract_text.to_string(),
                    impact_factor: 50.5,
                    published_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn no_votes_is_a_noop() {
        let store = store_with_articles().await;
        let model = ScriptedModel::new();

        let result = PreferenceLearner::new(&store, &model).update().await.unwrap();

        assert_eq!(result, None);
        assert_eq!(store.profile_text().await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_replaces_profile_and_consumes_exactly_the_new_votes() {
        let store = store_with_articles().await;
        let model = ScriptedModel::new();
        model.push_ok("LIKES: genomics\nDISLIKES: oncology");
        model.push_ok("LIKES: genomics, imaging\nDISLIKES: oncology");

        store
            .record_vote("10.1038/a", VotePolarity::Up, Utc::now())
            .await
            .unwrap();
        store
            .record_vote("10.1038/b", VotePolarity::Down, Utc::now())
            .await
            .unwrap();

        let learner = PreferenceLearner::new(&store, &model);
        let first = learner.update().await.unwrap();
        assert_eq!(first.as_deref(), Some("LIKES: genomics\nDISLIKES: oncology"));
        assert!(store.unconsumed_votes().await.unwrap().is_empty());

        // A later vote triggers a fresh replacement without touching the
        // already-consumed ones.
        store
            .record_vote("10.1038/a", VotePolarity::Up, Utc::now())
            .await
            .unwrap();
        let second = learner.update().await.unwrap();
        assert_eq!(
            second.as_deref(),
            Some("LIKES: genomics, imaging\nDISLIKES: oncology")
        );
        assert_eq!(
            store.profile_text().await.unwrap().as_deref(),
            Some("LIKES: genomics, imaging\nDISLIKES: oncology")
        );
        assert!(store.unconsumed_votes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_failure_mutates_nothing() {
        let store = store_with_articles().await;
        let model = ScriptedModel::new();
        model.push_err("API down");

        store
            .record_vote("10.1038/a", VotePolarity::Up, Utc::now())
            .await
            .unwrap();

        let result = PreferenceLearner::new(&store, &model).update().await;

        assert!(result.is_err());
        assert_eq!(store.profile_text().await.unwrap(), None);
        assert_eq!(store.unconsumed_votes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn vote_for_vanished_article_is_skipped() {
        let store = store_with_articles().await;
        let model = ScriptedModel::new();
        model.push_ok("LIKES: something\nDISLIKES: nothing");

        // The collaborator normally rejects unknown DOIs, but the learner
        // still has to cope with a dangling reference. Foreign-key
        // enforcement must be off while planting the fixture row.
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO votes (doi, polarity, cast_at, consumed) VALUES ('10.1/gone', 'up', $1, 0)")
            .bind(Utc::now())
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&store.pool)
            .await
            .unwrap();

        let result = PreferenceLearner::new(&store, &model).update().await.unwrap();
        assert!(result.is_some());
        assert!(store.unconsumed_votes().await.unwrap().is_empty());
    }
}
