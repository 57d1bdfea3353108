//! carve-client: Synchronization client for the carve analysis server.
//!
//! Provides:
//! - Connection management with authenticated handshake
//! - Request/reply correlation by qid
//! - Static routing of inbound messages
//! - A cached mirror of the remote node tree
//! - Row/column projections over the tree for read-only consumers

pub mod client;
pub mod model;
pub mod request;
pub mod route;
pub mod tree;

pub use client::{Client, ClientConfig, ConnectionStatus};
pub use model::{ModelIndex, NodeTreeModel, TopLevelResourcesModel};
pub use request::{RequestHandle, RequestOutcome, RequestTracker};
pub use route::{Route, route};
pub use tree::{ModificationScope, Node, NodeTree, TreeEvent};
