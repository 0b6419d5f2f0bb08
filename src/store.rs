use crate::types::{
    Article, ArticleCandidate, DigestError, DigestRecord, Result, Vote, VotePolarity,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        doi TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        journal TEXT NOT NULL,
        link TEXT NOT NULL,
        abstract TEXT NOT NULL,
        impact_factor REAL NOT NULL,
        published_at TEXT NOT NULL,
        summary TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        doi TEXT NOT NULL REFERENCES articles(doi),
        polarity TEXT NOT NULL,
        cast_at TEXT NOT NULL,
        consumed INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS digests (
        id TEXT PRIMARY KEY,
        date TEXT NOT NULL UNIQUE,
        highlight_doi TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS digest_articles (
        digest_id TEXT NOT NULL REFERENCES digests(id),
        doi TEXT NOT NULL REFERENCES articles(doi),
        position INTEGER NOT NULL,
        PRIMARY KEY (digest_id, doi)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS preference_profile (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        text TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// The storage handle passed into each pipeline component. Articles,
/// votes, the preference profile and digests live here; each is mutated
/// by exactly one component.
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    /// Connect and ensure the schema exists. A single connection is
    /// enough: the pipeline is strictly sequential, and it keeps
    /// `sqlite::memory:` databases alive across calls in tests.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .connect(database_url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!("connected to store: {}", database_url);
        Ok(Self { pool })
    }

    /// Insert the candidate unless an article with that DOI already
    /// exists, and return the stored row. The existing record wins:
    /// re-ingestion never refreshes title/abstract/link for a known
    /// identifier.
    pub async fn upsert_article(&self, candidate: &ArticleCandidate) -> Result<Article> {
        sqlx::query(
            r#"
            INSERT INTO articles (doi, title, journal, link, abstract, impact_factor, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (doi) DO NOTHING
            "#,
        )
        .bind(&candidate.doi)
        .bind(&candidate.title)
        .bind(&candidate.journal)
        .bind(&candidate.link)
        .bind(&candidate.abstract_text)
        .bind(candidate.impact_factor)
        .bind(candidate.published_at)
        .execute(&self.pool)
        .await?;

        self.get_article(&candidate.doi).await?.ok_or_else(|| {
            DigestError::Database(sqlx::Error::RowNotFound)
        })
    }

    pub async fn get_article(&self, doi: &str) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE doi = $1")
            .bind(doi)
            .fetch_optional(&self.pool)
            .await?;
        row.map(article_from_row).transpose()
    }

    /// Attach a generated summary to a stored article.
    pub async fn set_summary(&self, doi: &str, summary: &str) -> Result<()> {
        sqlx::query("UPDATE articles SET summary = $1 WHERE doi = $2")
            .bind(summary)
            .bind(doi)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a feedback vote. The HTTP collaborator validates the DOI
    /// against the store before this is called.
    pub async fn record_vote(
        &self,
        doi: &str,
        polarity: VotePolarity,
        cast_at: DateTime<Utc>,
    ) -> Result<Vote> {
        let row = sqlx::query(
            r#"
            INSERT INTO votes (doi, polarity, cast_at, consumed)
            VALUES ($1, $2, $3, 0)
            RETURNING id
            "#,
        )
        .bind(doi)
        .bind(polarity.as_str())
        .bind(cast_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(Vote {
            id: row.try_get("id")?,
            doi: doi.to_string(),
            polarity,
            cast_at,
            consumed: false,
        })
    }

    /// Votes not yet folded into the preference profile, oldest first.
    pub async fn unconsumed_votes(&self) -> Result<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE consumed = 0 ORDER BY cast_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(vote_from_row).collect()
    }

    pub async fn profile_text(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT text FROM preference_profile WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get("text")).transpose()?)
    }

    /// Replace the preference profile and mark the given votes consumed,
    /// in one transaction. A crash can never leave votes consumed
    /// without the matching profile update, or vice versa.
    pub async fn replace_profile_and_consume(
        &self,
        text: &str,
        vote_ids: &[i64],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO preference_profile (id, text, updated_at)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET text = EXCLUDED.text, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(text)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        for id in vote_ids {
            sqlx::query("UPDATE votes SET consumed = 1 WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!("preference profile replaced; {} votes consumed", vote_ids.len());
        Ok(())
    }

    /// Replace the digest for `date` wholesale: any existing snapshot
    /// and its article associations are deleted before the new one is
    /// written. Never merges.
    pub async fn replace_digest(
        &self,
        date: NaiveDate,
        dois: &[String],
        highlight: Option<&str>,
    ) -> Result<DigestRecord> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM digest_articles
            WHERE digest_id IN (SELECT id FROM digests WHERE date = $1)
            "#,
        )
        .bind(date)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM digests WHERE date = $1")
            .bind(date)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO digests (id, date, highlight_doi) VALUES ($1, $2, $3)")
            .bind(id.to_string())
            .bind(date)
            .bind(highlight)
            .execute(&mut *tx)
            .await?;
        for (position, doi) in dois.iter().enumerate() {
            sqlx::query("INSERT INTO digest_articles (digest_id, doi, position) VALUES ($1, $2, $3)")
                .bind(id.to_string())
                .bind(doi)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(DigestRecord {
            id,
            date,
            dois: dois.to_vec(),
            highlight: highlight.map(|s| s.to_string()),
        })
    }

    pub async fn digest_for(&self, date: NaiveDate) -> Result<Option<DigestRecord>> {
        let row = sqlx::query("SELECT id, highlight_doi FROM digests WHERE date = $1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let id_text: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id_text)
            .map_err(|e| DigestError::Parse(format!("digest id: {e}")))?;
        let highlight: Option<String> = row.try_get("highlight_doi")?;

        let dois =
            sqlx::query("SELECT doi FROM digest_articles WHERE digest_id = $1 ORDER BY position")
            .bind(&id_text)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.try_get("doi"))
            .collect::<std::result::Result<Vec<String>, sqlx::Error>>()?;

        Ok(Some(DigestRecord {
            id,
            date,
            dois,
            highlight,
        }))
    }
}

fn article_from_row(row: SqliteRow) -> Result<Article> {
    Ok(Article {
        doi: row.try_get("doi")?,
        title: row.try_get("title")?,
        journal: row.try_get("journal")?,
        link: row.try_get("link")?,
        abstract_text: row.try_get("abstract")?,
        impact_factor: row.try_get("impact_factor")?,
        published_at: row.try_get("published_at")?,
        summary: row.try_get("summary")?,
    })
}

fn vote_from_row(row: SqliteRow) -> Result<Vote> {
    let polarity: String = row.try_get("polarity")?;
    Ok(Vote {
        id: row.try_get("id")?,
        doi: row.try_get("doi")?,
        polarity: VotePolarity::parse(&polarity)?,
        cast_at: row.try_get("cast_at")?,
        consumed: row.try_get("consumed")?,
    })
}
