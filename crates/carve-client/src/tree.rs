//! In-memory mirror of the remote node tree.
//!
//! All nodes live in one arena map keyed by [`NodeId`]; parent links are ids,
//! not references, so lookup stays O(1) in both directions without lifetime
//! entanglement. Mutations are bracketed by begin/end events scoped to either
//! node data or children. Consumers must treat any index computed before the
//! begin event as invalid once the end event has fired; the `revision`
//! counter makes stale indices detectable.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use carve_core::protocol::{AttrValue, NodeId};

/// Which part of the visible structure a modification bracket invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationScope {
    /// Attributes or span of one node changed.
    NodeData,
    /// The child list of one node changed.
    Children,
}

/// Coarse invalidation event emitted around every cache mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// The structure under `id` is about to change.
    BeginModification {
        scope: ModificationScope,
        id: NodeId,
    },
    /// The change under `id` is complete; re-derive indices.
    EndModification {
        scope: ModificationScope,
        id: NodeId,
    },
}

/// One cached mirror of a remote object.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    parent: NodeId,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, AttrValue>,
    span: Option<(u64, u64)>,
    fetched: bool,
}

impl Node {
    fn stub(id: NodeId, parent: NodeId) -> Self {
        Node {
            id,
            parent,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            span: None,
            fetched: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent id; nil for the root and for detached stubs.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Server-assigned, display-significant child order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// String attribute lookup, used for the reserved `name`, `comment` and
    /// `path` keys.
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_str)
    }

    /// Byte-range span for chunk-like nodes; `end` exclusive.
    pub fn span(&self) -> Option<(u64, u64)> {
        self.span
    }

    pub fn start(&self) -> Option<u64> {
        self.span.map(|(start, _)| start)
    }

    pub fn end(&self) -> Option<u64> {
        self.span.map(|(_, end)| end)
    }

    /// Whether children/attributes reflect a completed fetch rather than a
    /// stub created because a parent named this id.
    pub fn is_fetched(&self) -> bool {
        self.fetched
    }
}

/// Owner of all cached nodes for one session.
pub struct NodeTree {
    nodes: HashMap<NodeId, Node>,
    revision: u64,
    events: broadcast::Sender<TreeEvent>,
}

impl NodeTree {
    /// Event channel depth. Consumers that fall behind see a lag error and
    /// should re-derive from scratch, which the coarse contract requires of
    /// them anyway.
    const EVENT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        let (events, _) = broadcast::channel(Self::EVENT_CAPACITY);
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, Node::stub(NodeId::ROOT, NodeId::NIL));
        NodeTree {
            nodes,
            revision: 0,
            events,
        }
    }

    /// O(1) lookup; absent for unknown ids.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn root(&self) -> &Node {
        // The root entry is re-created by reset() and never removed.
        self.nodes
            .get(&NodeId::ROOT)
            .unwrap_or_else(|| unreachable!("root node always cached"))
    }

    /// Number of cached nodes, the fresh root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Monotonic counter bumped once per completed modification bracket.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Subscribe to modification-bracket events.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Discard every node except a fresh, empty root. Called on every new
    /// connection so a stale tree from a prior session is never shown as
    /// current.
    pub fn reset(&mut self) {
        self.begin(ModificationScope::Children, NodeId::ROOT);
        self.nodes.clear();
        self.nodes
            .insert(NodeId::ROOT, Node::stub(NodeId::ROOT, NodeId::NIL));
        self.end(ModificationScope::Children, NodeId::ROOT);
        debug!("node tree reset");
    }

    /// Replace `parent`'s child list with the supplied ordered set.
    ///
    /// This is a full-replace, not a diff: previously cached children absent
    /// from the new set are detached together with their entire subtrees.
    /// Unknown child ids become stubs with `fetched == false`.
    ///
    /// The list arrives off the wire and is sanitized before use: nil ids,
    /// the root, the parent itself, and duplicates are skipped, keeping every
    /// cached node in exactly one child list and the root undeletable.
    pub fn apply_children(&mut self, parent: NodeId, children: &[NodeId]) {
        if !self.nodes.contains_key(&parent) {
            warn!(parent = %parent, "children reply for unknown parent; ignoring");
            return;
        }

        let mut children = children.to_vec();
        children.retain(|child| {
            let valid = !child.is_nil() && !child.is_root() && *child != parent;
            if !valid {
                warn!(parent = %parent, child = %child, "invalid child id in children reply; skipping");
            }
            valid
        });
        let mut seen = Vec::with_capacity(children.len());
        children.retain(|child| {
            let duplicate = seen.contains(child);
            if duplicate {
                warn!(parent = %parent, child = %child, "duplicate child id in children reply; skipping");
            } else {
                seen.push(*child);
            }
            !duplicate
        });
        let children = &children[..];

        self.begin(ModificationScope::Children, parent);

        let old_children = self
            .nodes
            .get(&parent)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for old_id in old_children {
            if !children.contains(&old_id) {
                self.remove_subtree(old_id);
            }
        }

        for &child in children {
            match self.nodes.get_mut(&child) {
                Some(node) => {
                    // A node listed under a new parent moves; it appears in
                    // exactly one child list at all times.
                    if node.parent != parent {
                        let previous = node.parent;
                        node.parent = parent;
                        if let Some(prev) = self.nodes.get_mut(&previous) {
                            prev.children.retain(|id| *id != child);
                        }
                    }
                }
                None => {
                    self.nodes.insert(child, Node::stub(child, parent));
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children = children.to_vec();
            node.fetched = true;
        }

        self.end(ModificationScope::Children, parent);
    }

    /// Merge attributes and span into `id`, creating the node if unknown.
    ///
    /// A node created here starts detached (nil parent) and becomes reachable
    /// by index once a later children reply names it.
    pub fn apply_attributes(
        &mut self,
        id: NodeId,
        attributes: BTreeMap<String, AttrValue>,
        span: Option<(u64, u64)>,
    ) {
        self.begin(ModificationScope::NodeData, id);

        let node = self
            .nodes
            .entry(id)
            .or_insert_with(|| Node::stub(id, NodeId::NIL));
        for (key, value) in attributes {
            node.attributes.insert(key, value);
        }
        if span.is_some() {
            node.span = span;
        }
        node.fetched = true;

        self.end(ModificationScope::NodeData, id);
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
    }

    fn begin(&self, scope: ModificationScope, id: NodeId) {
        let _ = self.events.send(TreeEvent::BeginModification { scope, id });
    }

    fn end(&mut self, scope: ModificationScope, id: NodeId) {
        self.revision += 1;
        let _ = self.events.send(TreeEvent::EndModification { scope, id });
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
