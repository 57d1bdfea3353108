//! Core identifier and value types shared by protocol payloads and the
//! client-side node cache.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::NODE_ID_LEN;

/// Stable opaque identifier for a remote node, unique within a session.
///
/// Two values are well-known: [`NodeId::NIL`] (invalid/absent) and
/// [`NodeId::ROOT`] (top of the remote tree).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// The invalid/absent identifier.
    pub const NIL: NodeId = NodeId([0u8; NODE_ID_LEN]);

    /// The root of the remote tree.
    pub const ROOT: NodeId = NodeId([0xFFu8; NODE_ID_LEN]);

    /// Construct from raw bytes.
    pub const fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        NodeId(bytes)
    }

    /// Raw byte view.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == NodeId::NIL
    }

    pub fn is_root(&self) -> bool {
        *self == NodeId::ROOT
    }

    /// Lowercase hex rendering, used by display models and logs.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(NODE_ID_LEN * 2);
        for byte in &self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "NodeId(nil)")
        } else if self.is_root() {
            write!(f, "NodeId(root)")
        } else {
            write!(f, "NodeId({})", self.to_hex())
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Typed attribute value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// UTF-8 string value.
    Str(String),
    /// Signed integer value.
    Int(i64),
    /// Opaque binary data.
    Bytes(Vec<u8>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttrValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

/// Snapshot of one remote node as carried by `get_reply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identifier.
    pub id: NodeId,
    /// Attribute map; reserved keys are `name`, `comment`, `path`.
    pub attributes: BTreeMap<String, AttrValue>,
    /// Byte-range start for chunk-like nodes.
    pub start: Option<u64>,
    /// Byte-range end (exclusive) for chunk-like nodes.
    pub end: Option<u64>,
}

impl NodeInfo {
    /// Span as a `(start, end)` pair, present only when both ends are known.
    pub fn span(&self) -> Option<(u64, u64)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}
