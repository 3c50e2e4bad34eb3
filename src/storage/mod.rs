//! Storage backends for ragchat

pub mod jsonl;
mod sqlite;
pub mod vector;

pub use jsonl::{read_passages, PassageRecord};
pub use sqlite::{AccountStore, SessionRecord, UserRecord};
pub use vector::{LanceIndex, Passage, QueryMatch, VectorIndex};
