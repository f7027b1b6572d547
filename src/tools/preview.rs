//! Preview tool: resolve a directive batch into suggestions without
//! touching the document.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{OpenDocument, Session};
use crate::config::Settings;
use crate::fixer::Directive;
use crate::server::{ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewParams {
    pub document_path: String,
    pub directives: Vec<Directive>,
    #[serde(default)]
    pub settings: Settings,
}

pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "preview".to_owned(),
        description: "Match find/replace directives against a document and return one suggestion \
            per affected element, with word diffs. Nothing is written; pass the approved \
            suggestions to `apply`."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "documentPath": {
                    "type": "string",
                    "description": "JSON document tree, relative to the workspace"
                },
                "directives": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "fragment": { "type": "string" },
                            "replaceWith": { "type": "string" }
                        },
                        "required": ["fragment", "replaceWith"]
                    }
                },
                "settings": {
                    "type": "object",
                    "properties": {
                        "aiThreshold": { "type": "number", "default": 0.15 },
                        "maxCandidates": { "type": "integer", "default": 3 },
                        "includeLog": { "type": "boolean", "default": false }
                    }
                }
            },
            "required": ["documentPath", "directives"]
        }),
    }
}

/// # Errors
///
/// Returns an error if the parameters, the document or its store are invalid.
pub fn execute(session: &mut Session, arguments: serde_json::Value) -> Result<ToolCallResult> {
    let params: PreviewParams =
        serde_json::from_value(arguments).context("invalid preview parameters")?;
    let open = match OpenDocument::open(&session.workspace, &params.document_path) {
        Ok(open) => open,
        Err(e) => return Ok(ToolCallResult::error(format!("Error: {e:#}"))),
    };

    let preview = session
        .engine
        .generate_preview(&open.document, &params.directives, &params.settings)?;
    session.previewed = Some(open.path);

    Ok(ToolCallResult::text(serde_json::to_string_pretty(&preview)?))
}
