//! Context assembly for RAG-style prompt construction

use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::storage::{QueryMatch, VectorIndex};

/// Maximum number of passages placed in a context block
pub const MAX_CONTEXT_PASSAGES: usize = 3;

/// Context used when retrieval finds nothing usable
pub const NO_CONTEXT: &str = "No relevant data found.";

/// Join retrieved passage texts into a single context block.
///
/// Empty or missing texts are ignored and duplicates are dropped keeping the
/// first occurrence, so the block follows the index's ranking. At most
/// [`MAX_CONTEXT_PASSAGES`] texts are kept.
pub fn assemble_context(results: &[QueryMatch]) -> String {
    let mut seen = HashSet::new();
    let texts: Vec<&str> = results
        .iter()
        .filter_map(|m| m.text.as_deref())
        .filter(|text| !text.is_empty())
        .filter(|text| seen.insert(*text))
        .take(MAX_CONTEXT_PASSAGES)
        .collect();

    if texts.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        texts.join("\n")
    }
}

/// Wrap the context block and the user's message into the generation prompt
pub fn build_prompt(context: &str, message: &str) -> String {
    format!("Use the following context to answer the query:\n\n{context}\n\nUser Query: {message}")
}

/// Retrieved context ready for prompt construction
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    /// Raw index hits, nearest first
    pub matches: Vec<QueryMatch>,

    /// Assembled context block
    pub context: String,
}

/// Embeds queries and looks them up in the passage index
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl RetrievalEngine {
    /// Pair an embedder with an index. Their vector dimensions must agree.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Result<Self> {
        if embedder.dimensions() != index.dimensions() {
            return Err(Error::config(format!(
                "embedder produces {}-dimensional vectors but the index stores {}",
                embedder.dimensions(),
                index.dimensions()
            )));
        }

        Ok(Self {
            embedder,
            index,
            top_k,
        })
    }

    /// Retrieve context for a query. Embedding and index failures are retrieval errors.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalContext> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| Error::retrieval(e.to_string()))?;

        let matches = self
            .index
            .query(&embedding, self.top_k)
            .await
            .map_err(|e| Error::retrieval(e.to_string()))?;

        tracing::debug!(
            hits = matches.len(),
            best_score = matches.first().map(QueryMatch::score),
            "index queried"
        );

        let context = assemble_context(&matches);
        Ok(RetrievalContext { matches, context })
    }
}
