//! Apply tool: write approved suggestions into the previewed document.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use super::{OpenDocument, Session};
use crate::engine::ApplySummary;
use crate::server::{ToolCallResult, ToolDefinition};
use crate::suggest::Suggestion;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyParams {
    pub document_path: String,
    /// Approved subset of the preview's suggestions.
    pub suggestions: Vec<Suggestion>,
}

pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "apply".to_owned(),
        description: "Apply approved suggestions from the last preview of the same document. \
            Elements edited since the preview are skipped unless every fragment is still \
            present. The overwritten text is kept for `undo`."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "documentPath": {
                    "type": "string",
                    "description": "The document passed to `preview`"
                },
                "suggestions": {
                    "type": "array",
                    "description": "Suggestions returned by `preview`, unmodified",
                    "items": { "type": "object" }
                }
            },
            "required": ["documentPath", "suggestions"]
        }),
    }
}

/// # Errors
///
/// Returns an error if the parameters are invalid, no matching preview is
/// pending, or the document cannot be written back.
pub fn execute(session: &mut Session, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: ApplyParams =
        serde_json::from_value(arguments).context("invalid apply parameters")?;
    let mut open = match OpenDocument::open(&session.workspace, &params.document_path) {
        Ok(open) => open,
        Err(e) => return Ok(ToolCallResult::error(format!("Error: {e:#}"))),
    };

    if session.previewed.as_deref() != Some(open.path.as_path()) {
        warn!(path = %open.path.display(), "apply without a preview of this document");
        return Ok(ToolCallResult::error(format!(
            "Error: no pending preview for {}; run `preview` first",
            params.document_path
        )));
    }

    let summary = apply_and_save(session, &mut open, &params.suggestions)?;
    Ok(ToolCallResult::text(serde_json::to_string_pretty(&summary)?))
}

/// Apply, write the document, and only then persist the backup.
fn apply_and_save(
    session: &mut Session,
    open: &mut OpenDocument,
    suggestions: &[Suggestion],
) -> Result<ApplySummary> {
    open.store.defer_writes();
    let summary = session
        .engine
        .apply_suggestions(&mut open.document, &mut open.store, suggestions)?;
    session.previewed = None;
    open.save_then_commit(summary.report.applied > 0)?;
    Ok(summary)
}
