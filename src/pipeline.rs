//! End-to-end chat request handling.
//!
//! A request runs while holding the user's transcript slot: the prior transcript
//! is merged with the new message, the merged text is embedded and looked up,
//! the retrieved context is framed into a prompt, and the model answers. The
//! exchange is written back only when the model produced an answer (including
//! the fallback answer after exhausted retries). Any earlier failure leaves the
//! transcript as it was.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::generation::GenerationInvoker;
use crate::memory::{compose_query, record_exchange, ConversationMemory};
use crate::retrieval::{build_prompt, RetrievalEngine};

/// Longest prompt prefix written to the log
const PROMPT_LOG_CHARS: usize = 300;

pub struct ChatPipeline {
    memory: Arc<ConversationMemory>,
    retrieval: RetrievalEngine,
    generator: GenerationInvoker,
}

impl ChatPipeline {
    pub fn new(
        memory: Arc<ConversationMemory>,
        retrieval: RetrievalEngine,
        generator: GenerationInvoker,
    ) -> Self {
        Self {
            memory,
            retrieval,
            generator,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer `message` for `user_id`, updating the user's transcript on success
    pub async fn handle(&self, user_id: &str, message: &str) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let span = tracing::info_span!("chat", user_id = %user_id, request_id = %Uuid::new_v4());
        self.answer(user_id, message).instrument(span).await
    }

    async fn answer(&self, user_id: &str, message: &str) -> Result<String> {
        tracing::info!(input = %message, "user input");

        let mut slot = self.memory.lock(user_id).await;
        let full_query = compose_query(slot.transcript(), message);

        let retrieved = self.retrieval.retrieve(&full_query).await.map_err(|e| {
            tracing::error!(error = %e, "retrieval failed");
            e
        })?;

        let prompt = build_prompt(&retrieved.context, message);
        tracing::info!(prompt = %log_excerpt(&prompt), "prompt built");

        let generation = self.generator.generate(&prompt).await?;
        let response = generation.answer();

        slot.commit(record_exchange(&full_query, &response));
        tracing::info!(
            outcome = ?generation.outcome,
            attempts = generation.attempts,
            "exchange committed"
        );

        Ok(response)
    }
}

fn log_excerpt(prompt: &str) -> String {
    prompt
        .chars()
        .take(PROMPT_LOG_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}
