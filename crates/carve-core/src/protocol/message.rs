//! Top-level protocol message enum.
//!
//! Every wire tag the analysis server emits or accepts is a variant here,
//! so dispatch is a total match instead of a runtime-registered handler map.
//! The canonical string tag of each variant is available via [`Message::tag`]
//! for logging.

use serde::{Deserialize, Serialize};

use super::{AttrValue, NodeId, NodeInfo};

// =============================================================================
// Top-level Message Enum
// =============================================================================

/// Top-level protocol message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // =========================================================================
    // Session lifecycle
    // =========================================================================
    /// Client hello carrying identity fields; first framed message after the
    /// raw authentication key.
    Connect(ConnectPayload),
    /// Server acknowledgment that the session is established.
    Connected(ConnectedPayload),
    /// Server-reported protocol violation; fatal to the session.
    ProtoError(ErrorPayload),
    /// Server-reported connection failure; fatal to the session.
    ConnectionError(ErrorPayload),

    // =========================================================================
    // Client requests
    // =========================================================================
    /// List the children of a node.
    GetList(GetListPayload),
    /// Fetch the attributes and span of a node.
    Get(GetPayload),
    /// Fetch one data attribute of a node.
    GetData(GetDataPayload),
    /// Fetch a byte range of a node's binary data.
    GetBinData(GetBinDataPayload),
    /// Create a new span-bearing child node.
    CreateChunk(CreateChunkPayload),

    // =========================================================================
    // Server replies
    // =========================================================================
    /// Ordered children of a node.
    GetListReply(GetListReplyPayload),
    /// Attributes and span of one node.
    GetReply(GetReplyPayload),
    /// One data attribute value.
    GetDataReply(GetDataReplyPayload),
    /// Raw binary data range.
    GetBinDataReply(GetBinDataReplyPayload),
    /// Acknowledgment of a mutating request.
    RequestAck(RequestAckPayload),
    /// Failure of a mutating request.
    RequestError(RequestErrorPayload),
    /// Failure of a query.
    QueryError(QueryErrorPayload),
    /// Server cancelled a live query subscription.
    SubscriptionCancelled(SubscriptionCancelledPayload),

    // =========================================================================
    // Higher-level replies with no default tree effect
    // =========================================================================
    /// Listing of clients attached to the server.
    ConnectionsReply(ConnectionsReplyPayload),
    /// Parser/plugin registry listing.
    RegistryReply(RegistryReplyPayload),
    /// Result of a remote method invocation.
    MethodResult(MethodResultPayload),
    /// Failure of a remote method invocation.
    MethodError(MethodErrorPayload),
    /// Result of a broadcast invocation.
    BroadcastResult(BroadcastResultPayload),
    /// Server asks a plugin client to run a trigger.
    PluginTriggerRun(PluginTriggerRunPayload),
}

impl Message {
    /// Canonical wire tag of this message, for logs and diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Connect(_) => "connect",
            Message::Connected(_) => "connected",
            Message::ProtoError(_) => "proto_error",
            Message::ConnectionError(_) => "connection_error",
            Message::GetList(_) => "get_list",
            Message::Get(_) => "get",
            Message::GetData(_) => "get_data",
            Message::GetBinData(_) => "get_bindata",
            Message::CreateChunk(_) => "create_chunk",
            Message::GetListReply(_) => "get_list_reply",
            Message::GetReply(_) => "get_reply",
            Message::GetDataReply(_) => "get_data_reply",
            Message::GetBinDataReply(_) => "get_bindata_reply",
            Message::RequestAck(_) => "request_ack",
            Message::RequestError(_) => "request_error",
            Message::QueryError(_) => "query_error",
            Message::SubscriptionCancelled(_) => "subscription_cancelled",
            Message::ConnectionsReply(_) => "connections_reply",
            Message::RegistryReply(_) => "registry_reply",
            Message::MethodResult(_) => "method_result",
            Message::MethodError(_) => "method_error",
            Message::BroadcastResult(_) => "broadcast_result",
            Message::PluginTriggerRun(_) => "plugin_trigger_run",
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Client identity sent during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectPayload {
    /// Protocol version spoken by the client.
    pub protocol_version: u32,
    pub client_name: String,
    pub client_version: String,
    pub client_description: String,
    pub client_type: String,
    /// Ask the server to exit when this client disconnects.
    pub quit_on_close: bool,
}

/// Server-side session acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Protocol version spoken by the server.
    pub protocol_version: u32,
}

/// Error report carried by `proto_error` and `connection_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetListPayload {
    pub qid: u64,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPayload {
    pub qid: u64,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDataPayload {
    pub qid: u64,
    pub id: NodeId,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetBinDataPayload {
    pub qid: u64,
    pub id: NodeId,
    pub key: String,
    pub start: u64,
    pub end: u64,
}

/// Chunk creation request. The authoritative state change arrives later via
/// list/get replies once the server assigns the new node its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChunkPayload {
    pub qid: u64,
    pub parent: NodeId,
    pub name: String,
    pub kind: String,
    pub comment: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetListReplyPayload {
    pub qid: u64,
    /// Node whose child list this reply replaces.
    pub parent: NodeId,
    /// Server-assigned, display-significant order.
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetReplyPayload {
    pub qid: u64,
    pub node: NodeInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDataReplyPayload {
    pub qid: u64,
    pub key: String,
    pub data: AttrValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetBinDataReplyPayload {
    pub qid: u64,
    pub data: Vec<u8>,
}

/// Acknowledgment of a mutating request; `rid` echoes the request qid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAckPayload {
    pub rid: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestErrorPayload {
    pub rid: u64,
    pub code: String,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryErrorPayload {
    pub qid: u64,
    pub code: String,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionCancelledPayload {
    pub qid: u64,
}

/// One attached client, as listed by `connections_reply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub client_id: u64,
    pub client_name: String,
    pub client_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsReplyPayload {
    pub qid: u64,
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryReplyPayload {
    pub qid: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResultPayload {
    pub mid: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodErrorPayload {
    pub mid: u64,
    pub code: String,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastResultPayload {
    pub bid: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginTriggerRunPayload {
    pub ptid: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn tags_match_wire_names() {
        let connect = Message::Connect(ConnectPayload {
            protocol_version: 1,
            client_name: "carve".into(),
            client_version: "0.1.0".into(),
            client_description: String::new(),
            client_type: "carve".into(),
            quit_on_close: false,
        });
        assert_eq!(connect.tag(), "connect");

        assert_eq!(
            Message::GetBinDataReply(GetBinDataReplyPayload {
                qid: 1,
                data: vec![]
            })
            .tag(),
            "get_bindata_reply"
        );
        assert_eq!(
            Message::QueryError(QueryErrorPayload {
                qid: 1,
                code: "E_NOENT".into(),
                msg: "not found".into(),
            })
            .tag(),
            "query_error"
        );
        assert_eq!(
            Message::SubscriptionCancelled(SubscriptionCancelledPayload { qid: 9 }).tag(),
            "subscription_cancelled"
        );
    }

    #[test]
    fn get_reply_carries_node_snapshot() {
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), AttrValue::from("chunk1"));

        let msg = Message::GetReply(GetReplyPayload {
            qid: 4,
            node: NodeInfo {
                id: NodeId::ROOT,
                attributes,
                start: Some(0),
                end: Some(16),
            },
        });

        match msg {
            Message::GetReply(reply) => {
                assert_eq!(reply.node.span(), Some((0, 16)));
                assert_eq!(
                    reply.node.attributes.get("name").and_then(AttrValue::as_str),
                    Some("chunk1")
                );
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn message_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Message>();
    }
}
