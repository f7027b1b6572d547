//! Element index: pre-order flattening of the document tree into leaves.
//!
//! Paragraphs, headings, list items, table cells and bare text runs are
//! terminal. Tables and rows are walked through; the root wrapper is never a
//! leaf. Nodes whose text cannot be read are skipped and do not consume an
//! index, and [`nth_leaf`]/[`nth_leaf_mut`] use the same numbering.

use tracing::{debug, warn};

use super::{DocumentElement, ElementType, Node, NodeKind};
use crate::error::DocumentError;

/// Flatten `root` into its leaf elements.
pub fn index(root: &Node) -> Result<Vec<DocumentElement>, DocumentError> {
    if root.kind == NodeKind::Unsupported {
        return Err(DocumentError::MissingRoot);
    }

    let mut out = Vec::new();
    for child in &root.children {
        visit(child, &mut out);
    }
    debug!(elements = out.len(), "document indexed");
    Ok(out)
}

fn visit(node: &Node, out: &mut Vec<DocumentElement>) {
    if let Some(kind) = ElementType::from_kind(node.kind) {
        match kind.read_text(node) {
            Ok(text) => out.push(DocumentElement::new(kind, out.len(), text)),
            Err(e) => warn!(kind = %kind, error = %e, "skipping unreadable element"),
        }
        return;
    }

    match node.kind {
        NodeKind::Unsupported => debug!("skipping unsupported node"),
        _ => {
            for child in &node.children {
                visit(child, out);
            }
        }
    }
}

/// The leaf at traversal position `target`.
pub fn nth_leaf(root: &Node, target: usize) -> Option<(ElementType, &Node)> {
    fn walk<'a>(node: &'a Node, target: usize, seen: &mut usize) -> Option<(ElementType, &'a Node)> {
        if let Some(kind) = ElementType::from_kind(node.kind) {
            if kind.read_text(node).is_ok() {
                if *seen == target {
                    return Some((kind, node));
                }
                *seen += 1;
            }
            return None;
        }
        if node.kind == NodeKind::Unsupported {
            return None;
        }
        node.children.iter().find_map(|child| walk(child, target, seen))
    }

    let mut seen = 0;
    root.children
        .iter()
        .find_map(|child| walk(child, target, &mut seen))
}

/// Mutable access to the leaf at traversal position `target`.
pub fn nth_leaf_mut(root: &mut Node, target: usize) -> Option<(ElementType, &mut Node)> {
    fn walk<'a>(
        node: &'a mut Node,
        target: usize,
        seen: &mut usize,
    ) -> Option<(ElementType, &'a mut Node)> {
        if let Some(kind) = ElementType::from_kind(node.kind) {
            if kind.read_text(node).is_ok() {
                if *seen == target {
                    return Some((kind, node));
                }
                *seen += 1;
            }
            return None;
        }
        if node.kind == NodeKind::Unsupported {
            return None;
        }
        for child in &mut node.children {
            if let Some(found) = walk(child, target, seen) {
                return Some(found);
            }
        }
        None
    }

    let mut seen = 0;
    for child in &mut root.children {
        if let Some(found) = walk(child, target, &mut seen) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::container(
            NodeKind::Body,
            vec![
                Node::block(NodeKind::Heading, "Title"),
                Node::block(NodeKind::Paragraph, "Intro"),
                Node::container(
                    NodeKind::Table,
                    vec![Node::container(
                        NodeKind::TableRow,
                        vec![
                            Node::container(
                                NodeKind::TableCell,
                                vec![Node::block(NodeKind::Paragraph, "A1")],
                            ),
                            Node::container(
                                NodeKind::TableCell,
                                vec![Node::block(NodeKind::Paragraph, "B1")],
                            ),
                        ],
                    )],
                ),
                Node {
                    kind: NodeKind::Unsupported,
                    text: None,
                    children: Vec::new(),
                },
                Node {
                    kind: NodeKind::Text,
                    text: None,
                    children: Vec::new(),
                },
                Node::block(NodeKind::ListItem, "Item"),
            ],
        )
    }

    #[test]
    fn test_preorder_leaves_only() {
        let elements = index(&sample()).expect("index");
        let texts: Vec<&str> = elements.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Title", "Intro", "A1", "B1", "Item"]);
        let kinds: Vec<ElementType> = elements.iter().map(|e| e.type_name).collect();
        assert_eq!(
            kinds,
            vec![
                ElementType::Heading,
                ElementType::Paragraph,
                ElementType::TableCell,
                ElementType::TableCell,
                ElementType::ListItem,
            ]
        );
        for (i, e) in elements.iter().enumerate() {
            assert_eq!(e.original_index, i);
        }
    }

    #[test]
    fn test_root_is_never_an_element() {
        let root = Node::block(NodeKind::Body, "whole document text");
        let elements = index(&root).expect("index");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].type_name, ElementType::Text);
    }

    #[test]
    fn test_unsupported_root_is_fatal() {
        let root = Node {
            kind: NodeKind::Unsupported,
            text: None,
            children: Vec::new(),
        };
        assert_eq!(index(&root), Err(DocumentError::MissingRoot));
    }

    #[test]
    fn test_nth_leaf_agrees_with_index() {
        let mut root = sample();
        let elements = index(&root).expect("index");
        for e in &elements {
            let (kind, node) = nth_leaf(&root, e.original_index).expect("leaf");
            assert_eq!(kind, e.type_name);
            assert_eq!(kind.read_text(node).expect("read"), e.text);
        }
        let (kind, node) = nth_leaf_mut(&mut root, 4).expect("leaf");
        assert_eq!(kind, ElementType::ListItem);
        kind.write_text(node, "Changed").expect("write");
        assert_eq!(index(&root).expect("index")[4].text, "Changed");
        assert!(nth_leaf(&root, 5).is_none());
    }
}
