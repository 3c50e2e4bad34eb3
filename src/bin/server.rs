//! ragchat server
//!
//! HTTP API for the chat backend.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragchat::{
    api::{self, AppState},
    auth::AuthService,
    config::Config,
    embedding::{FastEmbedder, TokenCounter},
    generation::{CommandProcess, GenerationInvoker},
    memory::ConversationMemory,
    pipeline::ChatPipeline,
    retrieval::RetrievalEngine,
    storage::{AccountStore, LanceIndex},
};

const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.ensure_dirs()?;
    tracing::info!("Starting ragchat server on port {}", config.server_port);
    tracing::info!("Data directory: {:?}", config.data_dir);

    // Model and collection are boot-time preconditions: fail here rather than per request
    let embedder = FastEmbedder::new(&config)?;
    let index = LanceIndex::open(&config).await?;
    tracing::info!(collection = %config.collection, "vector index and embedding model loaded");

    let memory = match config.max_transcript_tokens {
        Some(max_tokens) => {
            ConversationMemory::with_token_limit(max_tokens, Arc::new(TokenCounter::cl100k()?))
        }
        None => ConversationMemory::new(),
    };

    let retrieval = RetrievalEngine::new(Arc::new(embedder), Arc::new(index), config.top_k)?;
    let generator = GenerationInvoker::new(
        Arc::new(CommandProcess::from_config(&config.generation)),
        &config.generation,
    );
    let auth = AuthService::new(AccountStore::new(&config)?, config.token_ttl);

    let state = Arc::new(AppState {
        pipeline: ChatPipeline::new(Arc::new(memory), retrieval, generator),
        auth,
    });

    tokio::spawn(purge_expired_tokens(state.clone()));

    let app = api::router(state, &config.cors_origin)?;

    let port = config.server_port;
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn purge_expired_tokens(state: api::SharedState) {
    let mut interval = tokio::time::interval(TOKEN_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        let store = state.clone();
        let purged = tokio::task::spawn_blocking(move || store.auth.purge_expired()).await;
        match purged.map_err(ragchat::Error::from).and_then(|result| result) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "expired tokens purged"),
            Err(e) => tracing::warn!(error = %e, "failed to purge expired tokens"),
        }
    }
}
