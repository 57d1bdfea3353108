//! Row/column projections over the node tree for read-only consumers.
//!
//! A model is a short-lived borrow of the tree: it is cheap to construct and
//! is expected to be rebuilt after every invalidation bracket. A
//! [`ModelIndex`] records the tree revision it was minted at; once the tree
//! moves on, the index is rejected instead of resolving to the wrong row.

use carve_core::protocol::NodeId;

use crate::tree::NodeTree;

/// Column carrying the display name.
pub const COLUMN_NAME: usize = 0;
/// Column carrying the derived value (reserved, currently empty).
pub const COLUMN_VALUE: usize = 1;
/// Column carrying the comment text.
pub const COLUMN_COMMENT: usize = 2;
/// Column carrying the formatted `[start:end)` span.
pub const COLUMN_POS: usize = 3;

/// Transient (row, column, parent) address of one node.
///
/// Only valid between two consecutive invalidation brackets; resolving it
/// through a model checks the revision stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelIndex {
    id: NodeId,
    row: usize,
    column: usize,
    revision: u64,
}

impl ModelIndex {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn column(&self) -> usize {
        self.column
    }
}

/// Hex rendering used by the position column: at least four digits,
/// zero-padded, growing as needed.
fn zero_padded_hex(number: u64) -> String {
    format!("{:04x}", number)
}

/// Generic indexed projection over the whole tree.
pub struct NodeTreeModel<'a> {
    tree: &'a NodeTree,
    root: NodeId,
}

impl<'a> NodeTreeModel<'a> {
    pub fn new(tree: &'a NodeTree, root: NodeId) -> Self {
        NodeTreeModel { tree, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn column_count(&self) -> usize {
        4
    }

    pub fn header(&self, section: usize) -> Option<&'static str> {
        match section {
            COLUMN_NAME => Some("Name"),
            COLUMN_VALUE => Some("Value"),
            COLUMN_COMMENT => Some("Comment"),
            COLUMN_POS => Some("Position"),
            _ => None,
        }
    }

    pub fn row_count(&self, parent: NodeId) -> usize {
        self.tree
            .node(parent)
            .map(|node| node.children().len())
            .unwrap_or(0)
    }

    pub fn has_children(&self, parent: NodeId) -> bool {
        self.row_count(parent) > 0
    }

    pub fn child_at(&self, parent: NodeId, row: usize) -> Option<NodeId> {
        self.tree
            .node(parent)
            .and_then(|node| node.children().get(row).copied())
    }

    /// Parent id; nil for the root, unknown, or detached nodes.
    pub fn parent_of(&self, id: NodeId) -> NodeId {
        self.tree
            .node(id)
            .map(|node| node.parent())
            .unwrap_or(NodeId::NIL)
    }

    /// Row of `id` within its parent's child list; 0 for the root.
    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        if id == self.root {
            return Some(0);
        }
        let node = self.tree.node(id)?;
        let parent = self.tree.node(node.parent())?;
        parent.children().iter().position(|child| *child == id)
    }

    /// Mint an index for (row, column) under `parent`.
    pub fn index(&self, row: usize, column: usize, parent: NodeId) -> Option<ModelIndex> {
        if column >= self.column_count() {
            return None;
        }
        let id = self.child_at(parent, row)?;
        Some(ModelIndex {
            id,
            row,
            column,
            revision: self.tree.revision(),
        })
    }

    /// Stable id to transient address.
    pub fn index_from_id(&self, id: NodeId) -> Option<ModelIndex> {
        let row = self.row_of(id)?;
        Some(ModelIndex {
            id,
            row,
            column: COLUMN_NAME,
            revision: self.tree.revision(),
        })
    }

    /// Transient address back to the stable id; nil once the index is stale
    /// or the node is gone.
    pub fn id_from_index(&self, index: &ModelIndex) -> NodeId {
        if !self.is_valid(index) {
            return NodeId::NIL;
        }
        index.id
    }

    /// An index is valid only until the next invalidation bracket completes.
    pub fn is_valid(&self, index: &ModelIndex) -> bool {
        index.revision == self.tree.revision() && self.tree.node(index.id).is_some()
    }

    /// Display text for one column of `id`.
    pub fn data(&self, id: NodeId, column: usize) -> Option<String> {
        let node = self.tree.node(id)?;
        match column {
            COLUMN_NAME => Some(
                node.str_attribute("name")
                    .unwrap_or("[no name]")
                    .to_string(),
            ),
            // Chunk data item values are not mirrored yet.
            COLUMN_VALUE => Some(String::new()),
            COLUMN_COMMENT => Some(node.str_attribute("comment").unwrap_or("").to_string()),
            COLUMN_POS => self.position_text(id),
            _ => None,
        }
    }

    /// Formatted `start:end` span in fixed-width hex, absent for span-less
    /// nodes.
    pub fn position_text(&self, id: NodeId) -> Option<String> {
        let (start, end) = self.tree.node(id)?.span()?;
        Some(format!(
            "{}:{}",
            zero_padded_hex(start),
            zero_padded_hex(end)
        ))
    }

    pub fn span_start(&self, id: NodeId) -> Option<u64> {
        self.tree.node(id)?.start()
    }

    pub fn span_end(&self, id: NodeId) -> Option<u64> {
        self.tree.node(id)?.end()
    }

    /// Find the child of `parent` whose `[start, end)` span contains `pos`.
    pub fn index_from_pos(&self, pos: u64, parent: NodeId) -> Option<ModelIndex> {
        let node = self.tree.node(parent)?;
        for child_id in node.children() {
            if let Some((start, end)) = self.tree.node(*child_id).and_then(|child| child.span()) {
                if pos >= start && pos < end {
                    return self.index_from_id(*child_id);
                }
            }
        }
        None
    }
}

/// Read-only projection restricted to the immediate children of the root:
/// the top-level loaded resources. Reuses the same node storage.
pub struct TopLevelResourcesModel<'a> {
    tree: &'a NodeTree,
}

/// Resource path column.
pub const RESOURCE_COLUMN_PATH: usize = 0;
/// Resource node id column.
pub const RESOURCE_COLUMN_ID: usize = 1;

impl<'a> TopLevelResourcesModel<'a> {
    pub fn new(tree: &'a NodeTree) -> Self {
        TopLevelResourcesModel { tree }
    }

    pub fn column_count(&self) -> usize {
        2
    }

    pub fn header(&self, section: usize) -> Option<&'static str> {
        match section {
            RESOURCE_COLUMN_PATH => Some("Path"),
            RESOURCE_COLUMN_ID => Some("ID"),
            _ => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.tree.root().children().len()
    }

    pub fn id_at(&self, row: usize) -> Option<NodeId> {
        self.tree.root().children().get(row).copied()
    }

    pub fn data(&self, row: usize, column: usize) -> Option<String> {
        let id = self.id_at(row)?;
        match column {
            RESOURCE_COLUMN_PATH => Some(
                self.tree
                    .node(id)?
                    .str_attribute("path")
                    .unwrap_or("[no path available]")
                    .to_string(),
            ),
            RESOURCE_COLUMN_ID => Some(id.to_hex()),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
