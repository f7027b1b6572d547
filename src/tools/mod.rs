//! Tool router: registers and dispatches MCP tool calls.
//!
//! Every tool takes a `documentPath` inside the workspace. The document is
//! loaded fresh on each call and its key-value scope lives next to it in
//! `<document>.bulkfix.json`.

pub mod apply;
pub mod preview;
pub mod progress;
pub mod undo;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::document::Document;
use crate::engine::Engine;
use crate::server::{ToolCallResult, ToolDefinition};
use crate::store::FileStore;

/// Resolve `file_path` against `workspace`, refusing anything that leaves it.
///
/// Rejects null bytes, `..` escapes and symlinks pointing outside the
/// workspace. Paths that do not exist yet are resolved through their deepest
/// existing ancestor.
pub fn validate_path(workspace: &Path, file_path: &str) -> Result<PathBuf> {
    if file_path.contains('\0') {
        bail!("path contains null byte");
    }

    let raw = if Path::new(file_path).is_absolute() {
        PathBuf::from(file_path)
    } else {
        workspace.join(file_path)
    };
    let canonical_workspace = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());

    let resolved = if raw.exists() {
        raw.canonicalize()?
    } else {
        let mut ancestor = raw.clone();
        let mut suffix = Vec::new();
        loop {
            if ancestor.exists() {
                break suffix
                    .iter()
                    .rev()
                    .fold(ancestor.canonicalize()?, |acc, part| acc.join(part));
            }
            match (ancestor.file_name(), ancestor.parent()) {
                (Some(name), Some(parent)) => {
                    suffix.push(name.to_os_string());
                    ancestor = parent.to_path_buf();
                }
                _ => break raw.clone(),
            }
        }
    };

    if !resolved.starts_with(&canonical_workspace) {
        bail!("path escapes workspace boundary: {file_path}");
    }
    Ok(resolved)
}

/// A validated document path with its loaded tree and store.
pub(crate) struct OpenDocument {
    pub path: PathBuf,
    pub document: Document,
    pub store: FileStore,
}

impl OpenDocument {
    pub(crate) fn open(workspace: &Path, document_path: &str) -> Result<Self> {
        let path = validate_path(workspace, document_path)?;
        let document =
            Document::load(&path).with_context(|| format!("failed to load {}", path.display()))?;
        let store = FileStore::open(FileStore::path_for(&path))
            .with_context(|| format!("failed to open store for {}", path.display()))?;
        Ok(Self {
            path,
            document,
            store,
        })
    }

    pub(crate) fn save(&self) -> Result<()> {
        self.document
            .save(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Write the document when it changed, then the store changes held
    /// since [`FileStore::defer_writes`]. A failed document write leaves the
    /// store file as it was.
    pub(crate) fn save_then_commit(&mut self, document_changed: bool) -> Result<()> {
        if document_changed {
            self.save()?;
        }
        self.store
            .commit()
            .with_context(|| format!("failed to write store for {}", self.path.display()))
    }
}

/// State shared by the tools across calls.
#[derive(Debug)]
pub struct Session {
    pub workspace: PathBuf,
    pub engine: Engine,
    /// Document the pending preview was generated for.
    pub previewed: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ToolRouter {
    session: Session,
}

impl ToolRouter {
    pub fn new(workspace: PathBuf, engine: Engine) -> Self {
        Self {
            session: Session {
                workspace,
                engine,
                previewed: None,
            },
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            preview::tool_definition(),
            apply::tool_definition(),
            undo::tool_definition(),
            progress::tool_definition(),
        ]
    }

    /// Call a tool by name with the given JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails; the server turns it into an
    /// `isError` result.
    pub fn call_tool(&mut self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult> {
        debug!(tool = name, "dispatching tool call");
        match name {
            "preview" => preview::execute(&mut self.session, arguments),
            "apply" => apply::execute(&mut self.session, arguments),
            "undo" => undo::execute(&mut self.session, arguments),
            "progress" => progress::execute(&self.session, arguments),
            _ => Ok(ToolCallResult::error(format!("Unknown tool: {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_inside() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("doc.json"), "{}").expect("write");
        let path = validate_path(dir.path(), "doc.json").expect("inside");
        assert!(path.ends_with("doc.json"));
    }

    #[test]
    fn test_validate_path_not_yet_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = validate_path(dir.path(), "sub/new.json").expect("inside");
        assert!(path.ends_with("sub/new.json"));
    }

    #[test]
    fn test_validate_path_rejects_escape() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_path(dir.path(), "../outside.json").is_err());
        assert!(validate_path(dir.path(), "a\0b").is_err());
    }
}
