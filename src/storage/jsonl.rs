//! JSONL source files for passage ingestion

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One passage as written in an ingestion file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageRecord {
    /// Stable passage id. Defaults to the record's zero-based line number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Passage text, stored as the passage's metadata
    pub text: String,
}

/// Read passage records from a JSONL file.
///
/// Blank lines and records whose text is empty are skipped. Records without an id
/// get their zero-based line number, so skipped lines do not shift later ids.
/// Two records with the same id are an error.
pub fn read_passages(path: impl AsRef<Path>) -> Result<Vec<PassageRecord>> {
    let file = File::open(path.as_ref())?;
    parse_passages(BufReader::new(file))
}

/// Parse passage records from any buffered reader
pub fn parse_passages(reader: impl BufRead) -> Result<Vec<PassageRecord>> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let mut record: PassageRecord = serde_json::from_str(&line).map_err(|e| {
            Error::invalid_input(format!("line {}: {}", line_no + 1, e))
        })?;

        if record.text.trim().is_empty() {
            tracing::debug!(line = line_no + 1, "skipping passage with empty text");
            continue;
        }

        let id = record.id.get_or_insert_with(|| line_no.to_string());
        if !seen.insert(id.clone()) {
            return Err(Error::invalid_input(format!(
                "line {}: duplicate passage id '{}'",
                line_no + 1,
                id
            )));
        }
        records.push(record);
    }

    Ok(records)
}
