//! ragchat ingest
//!
//! Embeds passages from a JSONL file and writes them to the passage collection,
//! replacing whatever the collection held before.
//!
//! Usage: `ragchat-ingest <passages.jsonl>`

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragchat::{
    config::Config,
    embedding::FastEmbedder,
    storage::{read_passages, LanceIndex, Passage},
};

const EMBED_BATCH_SIZE: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: ragchat-ingest <passages.jsonl>")?;

    let config = Config::from_env()?;
    config.ensure_dirs()?;

    let records = read_passages(&path).with_context(|| format!("reading {}", path))?;
    tracing::info!("Loaded {} passages from {}", records.len(), path);

    let embedder = FastEmbedder::new(&config)?;
    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts, EMBED_BATCH_SIZE).await?;

    let passages: Vec<Passage> = records
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (record, vector))| Passage {
            id: record.id.unwrap_or_else(|| i.to_string()),
            text: Some(record.text),
            vector,
        })
        .collect();

    LanceIndex::create(&config, &passages).await?;
    tracing::info!(
        "Stored {} passages in collection '{}'",
        passages.len(),
        config.collection
    );

    Ok(())
}
