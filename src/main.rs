use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use journal_digest::{Config, DigestPipeline, ModelConfig, OpenAiClient, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "journal-digest", about = "Assemble the daily journal digest")]
struct Cli {
    /// SQLite database URL
    #[arg(long, default_value = "sqlite://journal_digest.db?mode=rwc")]
    database_url: String,

    /// Static preference-weight table, one `<topic> <weight>` per line
    #[arg(long, default_value = "preferences.txt")]
    preferences: PathBuf,

    /// Only articles published within this many days are considered
    #[arg(long, default_value_t = journal_digest::config::DEFAULT_WINDOW_DAYS)]
    window_days: i64,

    /// Maximum number of articles in the digest
    #[arg(long, default_value_t = journal_digest::config::DEFAULT_SHORTLIST)]
    shortlist: usize,

    /// Digest date (defaults to today, UTC)
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let model_config = ModelConfig::from_env().context("model configuration")?;
    let config = Config {
        feeds: Config::default_feeds(),
        preferences_file: cli.preferences,
        database_url: cli.database_url,
        window_days: cli.window_days,
        shortlist: cli.shortlist,
        model: model_config.clone(),
    };

    let store = Store::connect(&config.database_url)
        .await
        .context("connecting to store")?;
    let model = Arc::new(OpenAiClient::new(model_config));
    let pipeline = DigestPipeline::new(config, store, model);

    let date = cli.date.unwrap_or_else(|| Utc::now().date_naive());
    let report = pipeline.run(date).await.context("digest run")?;

    info!(
        "run complete: {}/{} feeds ok, {} candidates, {} shortlisted, digest={:?}, highlight={:?}",
        report.feeds_ok,
        report.feeds_ok + report.feeds_failed,
        report.candidates,
        report.shortlisted,
        report.digest_date,
        report.highlight
    );
    Ok(())
}
