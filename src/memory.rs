//! Per-user conversation memory

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::embedding::TokenCounter;

/// Marks a continuation turn inside a transcript
pub const FOLLOW_UP_PREFIX: &str = "Follow-up: ";

/// Marks a bot response inside a transcript
pub const BOT_PREFIX: &str = "Bot: ";

/// Build the text that gets embedded for a new message.
///
/// With no prior transcript this is the message itself, otherwise the transcript
/// followed by the message as a follow-up turn.
pub fn compose_query(previous: &str, message: &str) -> String {
    if previous.is_empty() {
        message.to_string()
    } else {
        format!("{previous}\n{FOLLOW_UP_PREFIX}{message}")
    }
}

/// Build the transcript stored after an exchange
pub fn record_exchange(full_query: &str, response: &str) -> String {
    format!("{full_query}\n{BOT_PREFIX}{response}")
}

/// Process-wide mapping from user identity to a rolling transcript.
///
/// Each user owns one slot guarded by its own async mutex, so holding a user's
/// slot never blocks other users. Transcripts live until the process exits.
pub struct ConversationMemory {
    transcripts: DashMap<String, Arc<Mutex<String>>>,
    limit: Option<TranscriptLimit>,
}

struct TranscriptLimit {
    max_tokens: u32,
    counter: Arc<TokenCounter>,
}

impl ConversationMemory {
    /// Create an unbounded memory
    pub fn new() -> Self {
        Self {
            transcripts: DashMap::new(),
            limit: None,
        }
    }

    /// Create a memory whose transcripts are trimmed to `max_tokens`
    pub fn with_token_limit(max_tokens: u32, counter: Arc<TokenCounter>) -> Self {
        Self {
            transcripts: DashMap::new(),
            limit: Some(TranscriptLimit {
                max_tokens,
                counter,
            }),
        }
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<String>> {
        // Clone out of the shard so its lock is released before awaiting
        self.transcripts
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Current transcript for a user, empty if the user has none
    pub async fn get(&self, user_id: &str) -> String {
        let slot = match self.transcripts.get(user_id) {
            Some(entry) => entry.value().clone(),
            None => return String::new(),
        };
        let transcript = slot.lock().await;
        transcript.clone()
    }

    /// Overwrite a user's transcript
    pub async fn put(&self, user_id: &str, transcript: String) {
        let mut guard = self.lock(user_id).await;
        guard.commit(transcript);
    }

    /// Take exclusive hold of a user's transcript until the guard is dropped.
    ///
    /// Requests for the same user that go through this are serialized.
    pub async fn lock(&self, user_id: &str) -> TranscriptGuard<'_> {
        let guard = self.slot(user_id).lock_owned().await;
        TranscriptGuard {
            guard,
            memory: self,
        }
    }

    /// Number of users with a slot
    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    fn bound(&self, transcript: String) -> String {
        let Some(limit) = &self.limit else {
            return transcript;
        };

        if limit.counter.count(&transcript) <= limit.max_tokens {
            return transcript;
        }

        // Drop whole lines from the front, always keeping the last one
        let mut rest = transcript.as_str();
        while let Some((_, tail)) = rest.split_once('\n') {
            rest = tail;
            if limit.counter.count(rest) <= limit.max_tokens {
                break;
            }
        }

        tracing::debug!(
            kept_bytes = rest.len(),
            dropped_bytes = transcript.len() - rest.len(),
            "transcript trimmed to token limit"
        );
        rest.to_string()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to one user's transcript
pub struct TranscriptGuard<'a> {
    guard: OwnedMutexGuard<String>,
    memory: &'a ConversationMemory,
}

impl TranscriptGuard<'_> {
    pub fn transcript(&self) -> &str {
        &self.guard
    }

    /// Replace the transcript, applying the memory's size bound if it has one
    pub fn commit(&mut self, transcript: String) {
        *self.guard = self.memory.bound(transcript);
    }
}
