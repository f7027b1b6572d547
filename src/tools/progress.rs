//! Progress tool: poll the current or last apply batch.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{Session, validate_path};
use crate::apply::progress::Progress;
use crate::server::{ToolCallResult, ToolDefinition};
use crate::store::FileStore;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Read the record persisted for this document instead of this
    /// process's tracker.
    #[serde(default)]
    pub document_path: Option<String>,
}

pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "progress".to_owned(),
        description: "Report `{applied, total, done}` for the running or last apply batch."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "documentPath": {
                    "type": "string",
                    "description": "Read the progress persisted for this document"
                }
            }
        }),
    }
}

/// # Errors
///
/// Returns an error if the parameters are invalid or the stored record is
/// unreadable.
pub fn execute(session: &Session, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: ProgressParams = if arguments.is_null() {
        ProgressParams::default()
    } else {
        serde_json::from_value(arguments).context("invalid progress parameters")?
    };

    let progress = match params.document_path {
        Some(document_path) => {
            let path = match validate_path(&session.workspace, &document_path) {
                Ok(p) => p,
                Err(e) => return Ok(ToolCallResult::error(format!("Error: {e:#}"))),
            };
            let store = FileStore::open(FileStore::path_for(&path))?;
            Progress::load(&store)?
        }
        None => session.engine.get_progress(),
    };

    Ok(ToolCallResult::text(serde_json::to_string(&progress)?))
}
