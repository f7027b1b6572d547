//! Undo backup batches.
//!
//! One batch per document, stored under [`LAST_RUN_BACKUP`]. A batch is
//! single-use: undo consumes it and deletes the key.

use serde::{Deserialize, Serialize};

use crate::document::ElementType;
use crate::error::{BulkfixError, BulkfixResult};
use crate::matching::MatchType;
use crate::store::{KvStore, LAST_RUN_BACKUP};
use crate::suggest::{ReplacementPart, Suggestion};

/// What one applied suggestion overwrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub para_index: usize,
    pub element_type: ElementType,
    /// Text actually overwritten, read right before the mutation.
    pub old_text: String,
    /// Text written by apply.
    pub new_text: String,
    pub fragment: String,
    pub replace_with: String,
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub replacement_count: usize,
    #[serde(default)]
    pub parts: Vec<ReplacementPart>,
}

impl BackupEntry {
    pub fn record(suggestion: &Suggestion, para_index: usize, old_text: String, new_text: String) -> Self {
        Self {
            para_index,
            element_type: suggestion.element_type,
            old_text,
            new_text,
            fragment: suggestion.fragment.clone(),
            replace_with: suggestion.replace_with.clone(),
            match_type: suggestion.match_type,
            replacement_count: suggestion.replacement_count,
            parts: suggestion.parts(),
        }
    }
}

pub fn load(store: &dyn KvStore) -> BulkfixResult<Option<Vec<BackupEntry>>> {
    let Some(raw) = store.get(LAST_RUN_BACKUP)? else {
        return Ok(None);
    };
    let entries: Vec<BackupEntry> =
        serde_json::from_str(&raw).map_err(|e| BulkfixError::CorruptRecord {
            key: LAST_RUN_BACKUP.to_owned(),
            reason: e.to_string(),
        })?;
    // An empty batch has nothing to revert.
    Ok(if entries.is_empty() { None } else { Some(entries) })
}

pub fn save(store: &mut dyn KvStore, entries: &[BackupEntry]) -> BulkfixResult<()> {
    store.set(LAST_RUN_BACKUP, serde_json::to_string(entries)?)
}

pub fn discard(store: &mut dyn KvStore) -> BulkfixResult<()> {
    store.delete(LAST_RUN_BACKUP)
}
