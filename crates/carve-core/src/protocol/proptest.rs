//! Property-based tests for the protocol codec.
//!
//! These tests use proptest to verify:
//! - Codec roundtrip for arbitrary messages
//! - Codec never panics on arbitrary input
//! - Length prefix correctness

#![cfg(test)]

use bytes::BytesMut;
use proptest::prelude::*;

use crate::protocol::{
    AttrValue, Codec, ConnectPayload, CreateChunkPayload, FRAME_HEADER_LEN, GetListReplyPayload,
    GetReplyPayload, Message, NodeId, NodeInfo, QueryErrorPayload,
};

// =============================================================================
// Arbitrary Generators
// =============================================================================

fn arb_node_id() -> impl Strategy<Value = NodeId> {
    any::<[u8; 24]>().prop_map(NodeId::from_bytes)
}

fn arb_attr_value() -> impl Strategy<Value = AttrValue> {
    prop_oneof![
        ".{0,32}".prop_map(AttrValue::Str),
        any::<i64>().prop_map(AttrValue::Int),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(AttrValue::Bytes),
    ]
}

prop_compose! {
    fn arb_node_info()(
        id in arb_node_id(),
        attributes in proptest::collection::btree_map("[a-z_]{1,12}", arb_attr_value(), 0..6),
        start in proptest::option::of(any::<u64>()),
        end in proptest::option::of(any::<u64>()),
    ) -> NodeInfo {
        NodeInfo { id, attributes, start, end }
    }
}

fn arb_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        (any::<u32>(), ".{0,16}", ".{0,16}", any::<bool>()).prop_map(
            |(protocol_version, client_name, client_type, quit_on_close)| {
                Message::Connect(ConnectPayload {
                    protocol_version,
                    client_name,
                    client_version: "0.1.0".into(),
                    client_description: String::new(),
                    client_type,
                    quit_on_close,
                })
            }
        ),
        (
            any::<u64>(),
            arb_node_id(),
            proptest::collection::vec(arb_node_id(), 0..16)
        )
            .prop_map(|(qid, parent, children)| {
                Message::GetListReply(GetListReplyPayload {
                    qid,
                    parent,
                    children,
                })
            }),
        (any::<u64>(), arb_node_info())
            .prop_map(|(qid, node)| Message::GetReply(GetReplyPayload { qid, node })),
        (any::<u64>(), "[A-Z_]{1,12}", ".{0,32}").prop_map(|(qid, code, msg)| {
            Message::QueryError(QueryErrorPayload { qid, code, msg })
        }),
        (any::<u64>(), arb_node_id(), ".{0,16}", any::<u64>(), any::<u64>()).prop_map(
            |(qid, parent, name, start, end)| {
                Message::CreateChunk(CreateChunkPayload {
                    qid,
                    parent,
                    name,
                    kind: "chunk".into(),
                    comment: String::new(),
                    start,
                    end,
                })
            }
        ),
    ]
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn roundtrip_arbitrary_message(msg in arb_message()) {
        let encoded = Codec::encode(&msg).unwrap();
        let decoded = Codec::decode_slice(&encoded).unwrap().unwrap();
        prop_assert_eq!(msg, decoded);
    }

    #[test]
    fn length_prefix_matches_payload(msg in arb_message()) {
        let encoded = Codec::encode(&msg).unwrap();
        let len = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        prop_assert_eq!(len, encoded.len() - FRAME_HEADER_LEN);
    }

    #[test]
    fn decode_never_panics_on_garbage(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut buf = BytesMut::from(&data[..]);
        // Any outcome is fine as long as we don't panic.
        let _ = Codec::decode(&mut buf);
    }

    #[test]
    fn split_frames_decode_once_complete(msg in arb_message(), split in 0usize..64) {
        let encoded = Codec::encode(&msg).unwrap();
        let cut = split.min(encoded.len());

        let mut buf = BytesMut::from(&encoded[..cut]);
        if cut < encoded.len() {
            prop_assert!(Codec::decode(&mut buf).unwrap().is_none());
            buf.extend_from_slice(&encoded[cut..]);
        }

        let decoded = Codec::decode(&mut buf).unwrap().unwrap();
        prop_assert_eq!(msg, decoded);
        prop_assert!(buf.is_empty());
    }
}
