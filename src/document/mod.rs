//! Host document model.
//!
//! The core only talks to documents through [`DocumentHost`]: a flat list of
//! leaf elements plus text read/write/find on one leaf at a time. [`Document`]
//! is the in-memory JSON tree implementation used by the MCP tools and tests.
//!
//! Leaves are a closed set ([`ElementType`]); each variant knows how to read,
//! write and search its own node shape, so there is no runtime probing for
//! text accessors.

pub mod index;

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BulkfixError, BulkfixResult, DocumentError};

pub use index::index;

/// Node kinds of the JSON document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Body,
    Paragraph,
    Heading,
    ListItem,
    Table,
    TableRow,
    TableCell,
    Text,
    /// Images, page breaks, equations: no text access.
    Unsupported,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::ListItem => "list_item",
            Self::Table => "table",
            Self::TableRow => "table_row",
            Self::TableCell => "table_cell",
            Self::Text => "text",
            Self::Unsupported => "unsupported",
        }
    }
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Self>,
}

impl Node {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text,
            text: Some(content.into()),
            children: Vec::new(),
        }
    }

    /// A block node holding a single text run.
    pub fn block(kind: NodeKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            text: None,
            children: vec![Self::text(content)],
        }
    }

    pub fn container(kind: NodeKind, children: Vec<Self>) -> Self {
        Self {
            kind,
            text: None,
            children,
        }
    }

    /// Concatenated text of all text runs below this node.
    fn run_text(&self) -> String {
        let mut out = String::new();
        self.collect_runs(&mut out);
        out
    }

    fn collect_runs(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            if child.kind != NodeKind::Unsupported {
                child.collect_runs(out);
            }
        }
    }

    /// Replace text runs with one run; inline unsupported children are kept.
    fn replace_runs(&mut self, content: &str) {
        let kept: Vec<Self> = self
            .children
            .drain(..)
            .filter(|c| c.kind == NodeKind::Unsupported)
            .collect();
        self.text = None;
        self.children = std::iter::once(Self::text(content)).chain(kept).collect();
    }
}

/// The closed set of matchable leaf kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Paragraph,
    Heading,
    ListItem,
    TableCell,
    Text,
}

impl ElementType {
    /// Leaf type for a node kind; containers and unsupported nodes are `None`.
    pub const fn from_kind(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Paragraph => Some(Self::Paragraph),
            NodeKind::Heading => Some(Self::Heading),
            NodeKind::ListItem => Some(Self::ListItem),
            NodeKind::TableCell => Some(Self::TableCell),
            NodeKind::Text => Some(Self::Text),
            NodeKind::Body | NodeKind::Table | NodeKind::TableRow | NodeKind::Unsupported => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paragraph => "Paragraph",
            Self::Heading => "Heading",
            Self::ListItem => "ListItem",
            Self::TableCell => "TableCell",
            Self::Text => "Text",
        }
    }

    /// Read the full text of a leaf node of this type.
    pub fn read_text(self, node: &Node) -> Result<String, DocumentError> {
        match self {
            Self::Paragraph | Self::Heading | Self::ListItem => Ok(node.run_text()),
            Self::TableCell => Ok(node
                .children
                .iter()
                .filter(|c| c.kind != NodeKind::Unsupported)
                .map(Node::run_text)
                .collect::<Vec<_>>()
                .join("\n")),
            Self::Text => node.text.clone().ok_or_else(|| DocumentError::Unsupported {
                kind: "empty text".to_owned(),
            }),
        }
    }

    /// Overwrite the full text of a leaf node of this type.
    pub fn write_text(self, node: &mut Node, content: &str) -> Result<(), DocumentError> {
        match self {
            Self::Paragraph | Self::Heading | Self::ListItem => node.replace_runs(content),
            Self::TableCell => {
                node.text = None;
                node.children = content
                    .split('\n')
                    .map(|line| Node::block(NodeKind::Paragraph, line))
                    .collect();
            }
            Self::Text => node.text = Some(content.to_owned()),
        }
        Ok(())
    }

    /// Literal (case-sensitive) search inside the leaf.
    pub fn find_literal(self, node: &Node, fragment: &str) -> Result<bool, DocumentError> {
        Ok(!fragment.is_empty() && self.read_text(node)?.contains(fragment))
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable, text-bearing unit of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentElement {
    /// Content-derived identity: type, traversal index and text hash.
    pub id: String,
    pub text: String,
    pub type_name: ElementType,
    /// Position in the leaf traversal; only stable within one scan.
    pub original_index: usize,
}

impl DocumentElement {
    pub fn new(type_name: ElementType, original_index: usize, text: String) -> Self {
        Self {
            id: element_id(type_name, original_index, &text),
            text,
            type_name,
            original_index,
        }
    }
}

/// Deterministic element identity: `<type>-<index>-<hash12>`.
pub fn element_id(type_name: ElementType, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_name.as_str().as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{index}-{}", type_name.as_str(), &digest[..12])
}

/// The document collaborator consumed by the core.
pub trait DocumentHost {
    /// Flatten the document into its leaf elements, in traversal order.
    fn leaf_elements(&self) -> Result<Vec<DocumentElement>, DocumentError>;

    /// Current text of the leaf at `index`.
    fn element_text(&self, index: usize) -> Result<String, DocumentError>;

    /// Overwrite the text of the leaf at `index`.
    fn set_element_text(&mut self, index: usize, text: &str) -> Result<(), DocumentError>;

    /// Literal substring test on the leaf at `index`.
    fn find_literal(&self, index: usize, fragment: &str) -> Result<bool, DocumentError>;
}

/// In-memory document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub root: Node,
}

impl Document {
    pub const fn new(root: Node) -> Self {
        Self { root }
    }

    /// A body holding one paragraph per string. Handy for tests and demos.
    pub fn from_paragraphs<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = paragraphs
            .into_iter()
            .map(|p| Node::block(NodeKind::Paragraph, p))
            .collect();
        Self::new(Node::container(NodeKind::Body, children))
    }

    pub fn from_json(json: &str) -> BulkfixResult<Self> {
        let root: Node = serde_json::from_str(json)?;
        Ok(Self::new(root))
    }

    pub fn to_json(&self) -> BulkfixResult<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Load a JSON document tree from disk.
    pub fn load(path: &Path) -> BulkfixResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| BulkfixError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Atomically write the document tree back to disk.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        crate::util::atomic::atomic_write_json(path, &self.root)
    }

    fn leaf(&self, index: usize) -> Result<(ElementType, &Node), DocumentError> {
        index::nth_leaf(&self.root, index).ok_or(DocumentError::NoSuchElement(index))
    }
}

impl DocumentHost for Document {
    fn leaf_elements(&self) -> Result<Vec<DocumentElement>, DocumentError> {
        index(&self.root)
    }

    fn element_text(&self, index: usize) -> Result<String, DocumentError> {
        let (kind, node) = self.leaf(index)?;
        kind.read_text(node)
    }

    fn set_element_text(&mut self, index: usize, text: &str) -> Result<(), DocumentError> {
        let (kind, node) =
            index::nth_leaf_mut(&mut self.root, index).ok_or(DocumentError::NoSuchElement(index))?;
        kind.write_text(node, text)
    }

    fn find_literal(&self, index: usize, fragment: &str) -> Result<bool, DocumentError> {
        let (kind, node) = self.leaf(index)?;
        kind.find_literal(node, fragment)
    }
}
