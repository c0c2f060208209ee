#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` is a set of roxmltree nodes identified by their `NodeId`.
//! Ids are positional, so a set built against one parse of a text stays
//! valid for any later parse of the same text.

use std::collections::HashSet;
use roxmltree::{Document, Node, NodeId, NodeType};

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<NodeId>,
}

impl NodeSet {
    /// Create a node set containing all nodes in the document.
    pub fn all(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc.descendants().map(|n| n.id()).collect(),
        }
    }

    /// All nodes except comments, which is what `URI=""` selects.
    pub fn all_without_comments(doc: &Document<'_>) -> Self {
        Self {
            nodes: doc
                .descendants()
                .filter(|n| n.node_type() != NodeType::Comment)
                .map(|n| n.id())
                .collect(),
        }
    }

    /// The subtree rooted at `root`, without comments (`URI="#id"`).
    pub fn tree_without_comments(root: Node<'_, '_>) -> Self {
        Self {
            nodes: root
                .descendants()
                .filter(|n| n.node_type() != NodeType::Comment)
                .map(|n| n.id())
                .collect(),
        }
    }

    /// The subtree rooted at `root`, with comments.
    pub fn tree_with_comments(root: Node<'_, '_>) -> Self {
        Self {
            nodes: root.descendants().map(|n| n.id()).collect(),
        }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: &Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id())
    }

    /// Remove `root` and all of its descendants.
    pub fn remove_subtree(&mut self, root: Node<'_, '_>) {
        for n in root.descendants() {
            self.nodes.remove(&n.id());
        }
    }
}
