//! Embedding generation using fastembed (local, no API keys)

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};

/// Maps free text to a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Identical input yields an identical vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of every vector this embedder returns
    fn dimensions(&self) -> usize;
}

/// Embedder backed by a local fastembed model
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    dimensions: usize,
}

impl FastEmbedder {
    /// Load the configured local model. Fails if the model is unknown, does not
    /// produce the configured dimension, or cannot be loaded.
    pub fn new(config: &Config) -> Result<Self> {
        let (kind, dimensions) = model_by_name(&config.embedding_model)?;
        if dimensions != config.embedding_dimensions {
            return Err(Error::config(format!(
                "{} produces {}-dimensional vectors, configured for {}",
                config.embedding_model, dimensions, config.embedding_dimensions
            )));
        }

        // Model downloads automatically on first use to ~/.cache/fastembed
        let model = TextEmbedding::try_new(InitOptions::new(kind).with_show_download_progress(true))
            .map_err(|e| Error::embedding(format!("Failed to load embedding model: {}", e)))?;

        tracing::info!(
            model = %config.embedding_model,
            dimensions = config.embedding_dimensions,
            "embedding model loaded"
        );

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimensions: config.embedding_dimensions,
        })
    }

    /// Generate embeddings for multiple texts
    pub async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.model.lock().await;
        guard
            .embed(texts.to_vec(), Some(batch_size))
            .map_err(|e| Error::embedding(format!("Embedding failed: {}", e)))
    }
}

/// Resolve a model name to its fastembed model and output dimension
fn model_by_name(name: &str) -> Result<(EmbeddingModel, usize)> {
    match name {
        "all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-MiniLM-L12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        other => Err(Error::config(format!("Unknown embedding model: {}", other))),
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut guard = self.model.lock().await;
        let embeddings = guard
            .embed(vec![text.to_string()], None)
            .map_err(|e| Error::embedding(format!("Embedding failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Token counter using tiktoken
pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    /// Create a new token counter for a specific model
    pub fn new(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| Error::config(format!("Failed to load tokenizer for {}: {}", model, e)))?;

        Ok(Self { bpe })
    }

    /// Counter using the cl100k_base encoding
    pub fn cl100k() -> Result<Self> {
        Self::new("gpt-4")
    }

    /// Count tokens in a text
    pub fn count(&self, text: &str) -> u32 {
        self.bpe.encode_with_special_tokens(text).len() as u32
    }
}
