//! Undo tool: revert the last applied batch of a document.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{OpenDocument, Session};
use crate::server::{ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoParams {
    pub document_path: String,
}

pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "undo".to_owned(),
        description: "Revert the last `apply` on a document. One-shot: a second call reports \
            that there is nothing to undo."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "documentPath": { "type": "string" }
            },
            "required": ["documentPath"]
        }),
    }
}

/// # Errors
///
/// Returns an error if the parameters are invalid or the document cannot be
/// written back.
pub fn execute(session: &mut Session, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: UndoParams = serde_json::from_value(arguments).context("invalid undo parameters")?;
    let mut open = match OpenDocument::open(&session.workspace, &params.document_path) {
        Ok(open) => open,
        Err(e) => return Ok(ToolCallResult::error(format!("Error: {e:#}"))),
    };

    open.store.defer_writes();
    let summary = session
        .engine
        .undo_last_run(&mut open.document, &mut open.store)?;
    if summary.report.undone > 0 {
        session.previewed = None;
    }
    open.save_then_commit(summary.report.undone > 0)?;

    Ok(ToolCallResult::text(serde_json::to_string_pretty(&summary)?))
}
