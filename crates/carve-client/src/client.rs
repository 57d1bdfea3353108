//! Client connection management.
//!
//! Handles the full session lifecycle:
//! 1. TCP connect (optionally bound to a local interface)
//! 2. Authentication: raw 64-byte key, then the framed `connect` hello
//! 3. `connected` acknowledgment and the initial root-children fetch
//! 4. Read loop decoding as many buffered frames as available per wake-up
//!
//! One logical thread of control drives all cache mutation and notification
//! delivery: every method takes `&mut self`, so no internal locking exists.
//! Callers awaiting a reply correlate through [`RequestHandle`]s instead of
//! blocking on the socket.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, trace, warn};

use carve_core::constants::{
    AUTH_KEY_LEN, CONNECT_TIMEOUT, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT, PROTOCOL_VERSION,
    UNSPECIFIED_VERSION,
};
use carve_core::error::{Error, Result};
use carve_core::protocol::{
    Codec, ConnectPayload, CreateChunkPayload, GetBinDataPayload, GetDataPayload, GetListPayload,
    GetPayload, Message, NodeId,
};

use crate::request::{RequestHandle, RequestTracker};
use crate::route::{Route, route};
use crate::tree::NodeTree;

/// Connection state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    NotConnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionStatus::NotConnected => "Not Connected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
        };
        f.write_str(text)
    }
}

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Analysis server host.
    pub server_host: String,
    /// Analysis server port.
    pub server_port: u16,
    /// Local interface to bind before connecting.
    pub local_interface: Option<IpAddr>,
    /// User-supplied authentication key; padded or truncated to 64 bytes on
    /// the wire.
    pub auth_key: Vec<u8>,
    pub client_name: String,
    pub client_version: String,
    pub client_description: String,
    pub client_type: String,
    /// Ask the server to exit when this client disconnects.
    pub quit_on_close: bool,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            local_interface: None,
            auth_key: Vec::new(),
            client_name: "carve".to_string(),
            client_version: UNSPECIFIED_VERSION.to_string(),
            client_description: String::new(),
            client_type: "carve".to_string(),
            quit_on_close: false,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// One session against the analysis server.
///
/// Owns the socket, the node-tree cache, and the qid counter. Reconnection is
/// manual: after a disconnect, a fresh [`Client::connect`] starts a brand-new
/// session and the tree is reset; outstanding request handles from the old
/// session simply never fire.
pub struct Client {
    config: ClientConfig,
    socket: Option<TcpStream>,
    status: ConnectionStatus,
    status_tx: watch::Sender<ConnectionStatus>,
    messages: broadcast::Sender<Arc<Message>>,
    tracker: RequestTracker,
    tree: NodeTree,
    rx_buf: BytesMut,
}

impl Client {
    /// Depth of the raw-message broadcast. Request handles that lag past this
    /// fall back to their timeout.
    const MESSAGE_CAPACITY: usize = 1024;

    pub fn new(config: ClientConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::NotConnected);
        let (messages, _) = broadcast::channel(Self::MESSAGE_CAPACITY);
        let tracker = RequestTracker::new(messages.clone());
        Client {
            config,
            socket: None,
            status: ConnectionStatus::NotConnected,
            status_tx,
            messages,
            tracker,
            tree: NodeTree::new(),
            rx_buf: BytesMut::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Observe connection status transitions. Redundant re-sets are not
    /// delivered.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Observe every decoded inbound message, independent of routing.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Arc<Message>> {
        self.messages.subscribe()
    }

    /// Read-only view of the cached node tree.
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Allocate a fresh request identifier.
    pub fn next_qid(&mut self) -> u64 {
        self.tracker.next_qid()
    }

    /// Mint a correlation handle for `qid`.
    pub fn track(&self, qid: u64) -> RequestHandle {
        self.tracker.track(qid)
    }

    /// Establish the session: open the socket, send the padded key and the
    /// hello message, and reset the tree.
    ///
    /// No-op while connecting or connected. Returns with the session in
    /// `Connecting`; the transition to `Connected` happens when the server's
    /// `connected` message is processed by the read loop.
    pub async fn connect(&mut self) -> Result<()> {
        if matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            debug!(status = %self.status, "connect ignored; session already active");
            return Ok(());
        }

        let key = pad_auth_key(&self.config.auth_key);
        info!(
            host = %self.config.server_host,
            port = self.config.server_port,
            interface = ?self.config.local_interface,
            "connecting to analysis server"
        );
        self.set_status(ConnectionStatus::Connecting);

        let opened = tokio::time::timeout(self.config.connect_timeout, self.open_socket()).await;
        let mut socket = match opened {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                warn!(error = %e, "socket connect failed");
                self.set_status(ConnectionStatus::NotConnected);
                return Err(e.into());
            }
            Err(_) => {
                warn!("socket connect timed out");
                self.set_status(ConnectionStatus::NotConnected);
                return Err(Error::Timeout);
            }
        };

        // Socket is up: authentication key first, hello message second.
        let hello = Codec::encode(&self.hello_message())?;
        let handshake = async {
            socket.write_all(&key).await?;
            socket.write_all(&hello).await?;
            std::io::Result::Ok(())
        };
        if let Err(e) = handshake.await {
            warn!(error = %e, "handshake write failed");
            self.set_status(ConnectionStatus::NotConnected);
            return Err(e.into());
        }
        debug!("sent authentication key and connect message");

        // A stale tree from a prior session must never be shown as current.
        self.tree.reset();
        self.rx_buf.clear();
        self.socket = Some(socket);
        Ok(())
    }

    /// Force the session down. Idempotent; safe from any state.
    pub async fn disconnect(&mut self) {
        self.set_status(ConnectionStatus::NotConnected);
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.shutdown().await;
            debug!("socket closed");
        }
        self.rx_buf.clear();
    }

    /// Encode and write one message. Silently drops the message when not
    /// connected; ordering across a disconnect is not guaranteed.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let Some(socket) = self.socket.as_mut() else {
            debug!(tag = msg.tag(), "not connected; dropping outbound message");
            return Ok(());
        };

        let frame = Codec::encode(msg)?;
        if let Err(e) = socket.write_all(&frame).await {
            warn!(error = %e, tag = msg.tag(), "socket write failed");
            self.teardown();
            return Err(e.into());
        }
        trace!(tag = msg.tag(), bytes = frame.len(), "sent message");
        Ok(())
    }

    /// Read once from the socket and process every complete buffered frame.
    ///
    /// Returns `Ok(true)` while the session is up, `Ok(false)` after an
    /// orderly close. Partial frames remain buffered across calls.
    pub async fn poll(&mut self) -> Result<bool> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(false);
        };

        match socket.read_buf(&mut self.rx_buf).await {
            Ok(0) => {
                info!("server closed the connection");
                self.teardown();
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "socket read failed");
                self.teardown();
                return Err(e.into());
            }
        }

        self.drain_frames().await?;
        Ok(self.socket.is_some())
    }

    /// Drive the session until it disconnects.
    pub async fn run(&mut self) -> Result<()> {
        while self.poll().await? {}
        Ok(())
    }

    /// Ask for the children of `id`.
    pub async fn request_children(&mut self, id: NodeId) -> Result<RequestHandle> {
        let qid = self.tracker.next_qid();
        let handle = self.tracker.track(qid);
        self.send(&Message::GetList(GetListPayload { qid, id })).await?;
        Ok(handle)
    }

    /// Ask for the attributes and span of `id`.
    pub async fn request_attributes(&mut self, id: NodeId) -> Result<RequestHandle> {
        let qid = self.tracker.next_qid();
        let handle = self.tracker.track(qid);
        self.send(&Message::Get(GetPayload { qid, id })).await?;
        Ok(handle)
    }

    /// Ask for one data attribute of `id`.
    pub async fn request_data(&mut self, id: NodeId, key: &str) -> Result<RequestHandle> {
        let qid = self.tracker.next_qid();
        let handle = self.tracker.track(qid);
        self.send(&Message::GetData(GetDataPayload {
            qid,
            id,
            key: key.to_string(),
        }))
        .await?;
        Ok(handle)
    }

    /// Ask for a byte range of `id`'s binary data.
    pub async fn request_bindata(
        &mut self,
        id: NodeId,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<RequestHandle> {
        let qid = self.tracker.next_qid();
        let handle = self.tracker.track(qid);
        self.send(&Message::GetBinData(GetBinDataPayload {
            qid,
            id,
            key: key.to_string(),
            start,
            end,
        }))
        .await?;
        Ok(handle)
    }

    /// Request creation of a new span-bearing child under `parent`.
    ///
    /// The local cache is not mutated optimistically; the authoritative state
    /// arrives through list/get replies once the server assigns the new node
    /// its identifier.
    pub async fn add_chunk(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: &str,
        comment: &str,
        start: u64,
        end: u64,
    ) -> Result<RequestHandle> {
        let qid = self.tracker.next_qid();
        let handle = self.tracker.track(qid);
        self.send(&Message::CreateChunk(CreateChunkPayload {
            qid,
            parent,
            name: name.to_string(),
            kind: kind.to_string(),
            comment: comment.to_string(),
            start,
            end,
        }))
        .await?;
        Ok(handle)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn hello_message(&self) -> Message {
        Message::Connect(ConnectPayload {
            protocol_version: PROTOCOL_VERSION,
            client_name: self.config.client_name.clone(),
            client_version: self.config.client_version.clone(),
            client_description: self.config.client_description.clone(),
            client_type: self.config.client_type.clone(),
            quit_on_close: self.config.quit_on_close,
        })
    }

    async fn open_socket(&self) -> std::io::Result<TcpStream> {
        let addr = lookup_host((self.config.server_host.as_str(), self.config.server_port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no address")
            })?;

        match self.config.local_interface {
            Some(interface) => {
                let socket = if addr.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.bind(SocketAddr::new(interface, 0))?;
                socket.connect(addr).await
            }
            None => TcpStream::connect(addr).await,
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            info!(status = %status, "connection status changed");
            let _ = self.status_tx.send(status);
        }
    }

    /// Drop the socket and force `NotConnected` without the shutdown
    /// round-trip; used on I/O failure paths.
    fn teardown(&mut self) {
        self.set_status(ConnectionStatus::NotConnected);
        self.socket = None;
        self.rx_buf.clear();
    }

    async fn drain_frames(&mut self) -> Result<()> {
        loop {
            match Codec::decode_frame(&mut self.rx_buf) {
                Ok(Some(payload)) => match Codec::decode_message(&payload) {
                    Ok(msg) => self.handle_message(msg).await?,
                    Err(e) => {
                        // Malformed message; the frame is consumed and the
                        // stream stays aligned.
                        warn!(error = %e, "dropping undecodable message");
                    }
                },
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "framing violation; aborting connection");
                    self.disconnect().await;
                    return Err(e);
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: Message) -> Result<()> {
        let msg = Arc::new(msg);
        trace!(tag = msg.tag(), "received message");

        match route(&msg) {
            Route::Connected => self.on_connected().await?,
            Route::FatalError => self.on_fatal_error(&msg).await,
            Route::Tree => self.apply_tree_message(&msg),
            Route::Hook => debug!(tag = msg.tag(), "no default effect for message"),
            Route::Unhandled => {
                debug!(tag = msg.tag(), "received message of unhandled type");
            }
        }

        // The raw-message broadcast fires after the handler, for request
        // handles and host subscribers alike.
        let _ = self.messages.send(msg);
        Ok(())
    }

    async fn on_connected(&mut self) -> Result<()> {
        if self.status != ConnectionStatus::Connecting {
            warn!(
                status = %self.status,
                "received \"connected\" while not connecting; ignoring"
            );
            return Ok(());
        }

        info!("session established");
        self.set_status(ConnectionStatus::Connected);

        // Kick off mirroring with the root's child list.
        let qid = self.tracker.next_qid();
        self.send(&Message::GetList(GetListPayload {
            qid,
            id: NodeId::ROOT,
        }))
        .await
    }

    async fn on_fatal_error(&mut self, msg: &Message) {
        match msg {
            Message::ProtoError(err) => {
                error!(code = %err.code, msg = %err.msg, "protocol error; aborting connection");
            }
            Message::ConnectionError(err) => {
                error!(code = %err.code, msg = %err.msg, "connection error; aborting connection");
            }
            _ => {}
        }
        self.disconnect().await;
    }

    fn apply_tree_message(&mut self, msg: &Message) {
        match msg {
            Message::GetListReply(reply) => {
                self.tree.apply_children(reply.parent, &reply.children);
            }
            Message::GetReply(reply) => {
                let attributes: BTreeMap<_, _> = reply.node.attributes.clone();
                self.tree
                    .apply_attributes(reply.node.id, attributes, reply.node.span());
            }
            // Data replies and request terminals carry no structural change;
            // request handles observe them on the broadcast.
            _ => trace!(tag = msg.tag(), "tree-relevant message with no structural effect"),
        }
    }
}

/// Pad or truncate a user-supplied key to the fixed 64-byte wire field,
/// zero-filled on the right.
pub(crate) fn pad_auth_key(key: &[u8]) -> [u8; AUTH_KEY_LEN] {
    let mut padded = [0u8; AUTH_KEY_LEN];
    let len = key.len().min(AUTH_KEY_LEN);
    padded[..len].copy_from_slice(&key[..len]);
    padded
}

// =============================================================================
// Tests
// =============================================================================
