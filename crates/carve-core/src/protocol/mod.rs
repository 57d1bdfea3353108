//! Protocol module for the carve wire format.
//!
//! This module provides:
//! - Node identifier and attribute value types
//! - Message types and payloads
//! - Length-prefixed bincode codec

mod codec;
mod message;
mod types;

#[cfg(test)]
mod proptest;

pub use codec::{Codec, FRAME_HEADER_LEN};
pub use message::*;
pub use types::{AttrValue, NodeId, NodeInfo};
