//! Static routing of inbound messages.
//!
//! Instead of a string-keyed handler registry, every message variant is
//! classified by a total match, so adding a wire tag without deciding its
//! routing is a compile error. Request correlation does not go through this
//! table; request handles watch the raw message broadcast instead.

use carve_core::protocol::Message;

/// Routing category for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Session handshake completed; triggers the initial root fetch.
    Connected,
    /// Server-reported error that is fatal to the session; log and disconnect.
    FatalError,
    /// Tree-relevant reply; forwarded to the node-tree cache updater.
    Tree,
    /// Higher-level reply with no default tree effect; broadcast only.
    Hook,
    /// Client-originated tag or anything else with no inbound handler; logged
    /// and dropped, not an error.
    Unhandled,
}

/// Classify one decoded inbound message.
pub fn route(msg: &Message) -> Route {
    match msg {
        Message::Connected(_) => Route::Connected,

        Message::ProtoError(_) | Message::ConnectionError(_) => Route::FatalError,

        Message::GetListReply(_)
        | Message::GetReply(_)
        | Message::GetDataReply(_)
        | Message::GetBinDataReply(_)
        | Message::RequestAck(_)
        | Message::RequestError(_)
        | Message::QueryError(_)
        | Message::SubscriptionCancelled(_) => Route::Tree,

        Message::ConnectionsReply(_)
        | Message::RegistryReply(_)
        | Message::MethodResult(_)
        | Message::MethodError(_)
        | Message::BroadcastResult(_)
        | Message::PluginTriggerRun(_) => Route::Hook,

        Message::Connect(_)
        | Message::GetList(_)
        | Message::Get(_)
        | Message::GetData(_)
        | Message::GetBinData(_)
        | Message::CreateChunk(_) => Route::Unhandled,
    }
}
