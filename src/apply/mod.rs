//! Apply and undo approved suggestions against the live document.
//!
//! # Apply
//!
//! The document is re-indexed on every call and suggestions are processed
//! highest `paraIndex` first. Each target is re-resolved in a fixed order:
//!
//! 1. element id (same position, same type, same text as at preview)
//! 2. position, when the element there has the recorded type
//! 3. first untouched element whose text equals the recorded `oldText`
//!
//! A target whose text changed since preview is still rewritten when the
//! suggestion is EXACT and every fragment is still present; anything else is
//! skipped with an error and the batch continues. The text actually
//! overwritten goes into the backup batch, which is persisted once after the
//! loop.
//!
//! # Undo
//!
//! Consumes the backup batch, highest `paraIndex` first. An element that
//! still holds the applied text gets the old text back verbatim. An element
//! edited after apply is reverted by replaying the recorded replacements in
//! reverse (EXACT) or by restoring the old text (AI).

pub mod backup;
pub mod progress;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::{DocumentElement, DocumentHost};
use crate::edit;
use crate::error::BulkfixResult;
use crate::matching::MatchType;
use crate::oplog::OperationLog;
use crate::store::KvStore;
use crate::suggest::Suggestion;

use backup::BackupEntry;
use progress::ProgressTracker;

/// Result of one apply batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub applied: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

/// Result of one undo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoReport {
    pub undone: usize,
    pub total: usize,
    pub errors: Vec<String>,
    /// No backup batch was stored.
    pub nothing_to_undo: bool,
}

/// Apply `suggestions` to `doc`, recording a backup batch in `store`.
///
/// Only a document whose leaves cannot be listed at all is an `Err`.
pub fn apply(
    doc: &mut dyn DocumentHost,
    store: &mut dyn KvStore,
    suggestions: &[Suggestion],
    progress: &ProgressTracker,
    log: &mut OperationLog,
) -> BulkfixResult<ApplyReport> {
    let elements = doc.leaf_elements()?;
    let mut report = ApplyReport {
        total: suggestions.len(),
        ..ApplyReport::default()
    };
    progress.reset(suggestions.len(), store);
    log.info(format!(
        "applying {} suggestion(s) across {} element(s)",
        suggestions.len(),
        elements.len()
    ));

    let mut ordered: Vec<&Suggestion> = suggestions.iter().collect();
    ordered.sort_by(|a, b| {
        b.para_index
            .cmp(&a.para_index)
            .then(a.directive_index.cmp(&b.directive_index))
    });

    let mut touched = BTreeSet::new();
    let mut backups = Vec::with_capacity(ordered.len());

    for suggestion in ordered {
        match apply_one(doc, &elements, &touched, suggestion) {
            Ok(entry) => {
                debug!(
                    para_index = entry.para_index,
                    replacements = entry.replacement_count,
                    "suggestion applied"
                );
                touched.insert(entry.para_index);
                report.applied += 1;
                backups.push(entry);
            }
            Err(reason) => {
                let message = format!("paragraph {}: {reason}", suggestion.para_index);
                log.warn(format!("skipped {message}"));
                report.errors.push(message);
            }
        }
        progress.advance(store);
    }

    if !backups.is_empty() {
        match backup::save(store, &backups) {
            Ok(()) => info!(entries = backups.len(), "backup persisted"),
            Err(e) => {
                log.warn(format!("backup not saved, undo unavailable: {e}"));
                report.errors.push(format!("backup not saved: {e}"));
            }
        }
    }

    progress.finish(store);
    log.info(format!("applied {}/{}", report.applied, report.total));
    Ok(report)
}

fn apply_one(
    doc: &mut dyn DocumentHost,
    elements: &[DocumentElement],
    touched: &BTreeSet<usize>,
    suggestion: &Suggestion,
) -> Result<BackupEntry, String> {
    let index = resolve_target(elements, touched, suggestion)
        .ok_or_else(|| "target element no longer exists".to_owned())?;
    if touched.contains(&index) {
        return Err("element already changed by this batch".to_owned());
    }

    let current = doc.element_text(index).map_err(|e| e.to_string())?;
    let new_text = if current == suggestion.old_text {
        suggestion.new_text.clone()
    } else if suggestion.match_type == MatchType::Exact && fragments_present(doc, index, &current, suggestion) {
        debug!(para_index = index, "text drifted, fragments still present");
        replay(&current, suggestion)?
    } else {
        return Err("text changed since preview".to_owned());
    };

    doc.set_element_text(index, &new_text)
        .map_err(|e| e.to_string())?;
    Ok(BackupEntry::record(suggestion, index, current, new_text))
}

fn resolve_target(
    elements: &[DocumentElement],
    touched: &BTreeSet<usize>,
    suggestion: &Suggestion,
) -> Option<usize> {
    let by_id = elements.iter().find(|e| e.id == suggestion.element_id);
    let by_index = || {
        elements
            .get(suggestion.para_index)
            .filter(|e| e.type_name == suggestion.element_type)
    };
    let by_text = || {
        elements
            .iter()
            .find(|e| !touched.contains(&e.original_index) && e.text == suggestion.old_text)
    };
    by_id
        .or_else(by_index)
        .or_else(by_text)
        .map(|e| e.original_index)
}

fn fragments_present(doc: &dyn DocumentHost, index: usize, current: &str, suggestion: &Suggestion) -> bool {
    suggestion.parts().iter().all(|part| {
        doc.find_literal(index, &part.fragment).unwrap_or(false)
            || edit::contains_fragment(current, &part.fragment)
    })
}

/// Re-run every recorded replacement, in order, on `text`.
fn replay(text: &str, suggestion: &Suggestion) -> Result<String, String> {
    suggestion
        .parts()
        .iter()
        .try_fold(text.to_owned(), |acc, part| {
            edit::substitute(&acc, &part.fragment, &part.replace_with)
                .ok_or_else(|| format!("fragment {:?} could not be replaced", part.fragment))
        })
}

/// Revert the last apply batch stored in `store`.
pub fn undo(
    doc: &mut dyn DocumentHost,
    store: &mut dyn KvStore,
    log: &mut OperationLog,
) -> BulkfixResult<UndoReport> {
    let entries = match backup::load(store) {
        Ok(Some(entries)) => entries,
        Ok(None) => {
            log.info("nothing to undo");
            return Ok(UndoReport {
                nothing_to_undo: true,
                ..UndoReport::default()
            });
        }
        Err(e) => {
            log.warn(format!("backup unreadable: {e}"));
            return Ok(UndoReport {
                errors: vec![e.to_string()],
                ..UndoReport::default()
            });
        }
    };

    let elements = doc.leaf_elements()?;
    let mut report = UndoReport {
        total: entries.len(),
        ..UndoReport::default()
    };
    log.info(format!("undoing {} change(s)", entries.len()));

    let mut ordered = entries;
    ordered.sort_by(|a, b| b.para_index.cmp(&a.para_index));

    for entry in &ordered {
        match undo_one(doc, &elements, entry) {
            Ok(()) => report.undone += 1,
            Err(reason) => {
                let message = format!("paragraph {}: {reason}", entry.para_index);
                log.warn(format!("not reverted {message}"));
                report.errors.push(message);
            }
        }
    }

    if let Err(e) = backup::discard(store) {
        warn!(error = %e, "backup not discarded");
        report.errors.push(format!("backup not discarded: {e}"));
    }
    log.info(format!("undid {}/{}", report.undone, report.total));
    Ok(report)
}

fn undo_one(doc: &mut dyn DocumentHost, elements: &[DocumentElement], entry: &BackupEntry) -> Result<(), String> {
    let index = resolve_backup_target(elements, entry)
        .ok_or_else(|| "element no longer exists".to_owned())?;
    let current = doc.element_text(index).map_err(|e| e.to_string())?;

    let restored = if current == entry.new_text {
        entry.old_text.clone()
    } else if entry.match_type == MatchType::Exact {
        debug!(para_index = index, "text drifted after apply, replaying in reverse");
        reverse_replay(&current, entry)?
    } else {
        entry.old_text.clone()
    };

    doc.set_element_text(index, &restored)
        .map_err(|e| e.to_string())
}

fn resolve_backup_target(elements: &[DocumentElement], entry: &BackupEntry) -> Option<usize> {
    let at_index = elements
        .get(entry.para_index)
        .filter(|e| e.type_name == entry.element_type);
    at_index
        .filter(|e| e.text == entry.new_text)
        .or_else(|| elements.iter().find(|e| e.text == entry.new_text))
        .or(at_index)
        .map(|e| e.original_index)
}

fn reverse_replay(text: &str, entry: &BackupEntry) -> Result<String, String> {
    entry.parts.iter().rev().try_fold(text.to_owned(), |acc, part| {
        edit::substitute(&acc, &part.replace_with, &part.fragment)
            .ok_or_else(|| format!("replacement {:?} no longer present", part.replace_with))
    })
}
