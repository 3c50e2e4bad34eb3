//! # ragchat
//!
//! A retrieval-augmented chat backend. Each message is merged with the user's
//! rolling transcript, embedded, matched against a passage index, framed into a
//! prompt together with the retrieved passages, and answered by a locally hosted
//! model process.
//!
//! ## Architecture
//!
//! - **Embedder** - local fastembed model, text to fixed-length vector
//! - **Vector Index** - LanceDB collection of ingested passages
//! - **Conversation Memory** - per-user transcripts, serialized per user
//! - **Context Assembler** - dedup and cap of retrieved passage texts
//! - **Generation Invoker** - model process with retry and timeout
//! - **Pipeline** - the request flow and its error classification
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragchat::{Config, ConversationMemory, ChatPipeline};
//! use ragchat::embedding::FastEmbedder;
//! use ragchat::generation::{CommandProcess, GenerationInvoker};
//! use ragchat::retrieval::RetrievalEngine;
//! use ragchat::storage::LanceIndex;
//!
//! let config = Config::from_env()?;
//! let retrieval = RetrievalEngine::new(
//!     Arc::new(FastEmbedder::new(&config)?),
//!     Arc::new(LanceIndex::open(&config).await?),
//!     config.top_k,
//! )?;
//! let generator = GenerationInvoker::new(
//!     Arc::new(CommandProcess::from_config(&config.generation)),
//!     &config.generation,
//! );
//! let pipeline = ChatPipeline::new(Arc::new(ConversationMemory::new()), retrieval, generator);
//!
//! let answer = pipeline.handle("42", "What concessions exist for senior citizens?").await?;
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod memory;
pub mod message;
pub mod pipeline;
pub mod retrieval;
pub mod storage;

pub use config::{Config, GenerationConfig};
pub use error::{Error, Result};
pub use memory::ConversationMemory;
pub use pipeline::ChatPipeline;
pub use retrieval::RetrievalContext;
