//! Wire codec for carve messages.
//!
//! Format: 4-byte little-endian length prefix + bincode-encoded Message
//!
//! Framing and message decoding are split so the read loop can drop a
//! malformed message without losing stream alignment:
//! - [`Codec::decode_frame`] only fails on framing violations (oversized
//!   length), which are fatal to the session
//! - [`Codec::decode_message`] fails per-message with a schema error; the
//!   frame is already consumed and the next one can be attempted

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::constants::MAX_MESSAGE_SIZE;
use crate::error::{Error, Result};
use crate::protocol::Message;

/// Length of the frame header (4 bytes, little-endian u32).
pub const FRAME_HEADER_LEN: usize = 4;

/// Codec for length-prefixed bincode encoding of messages.
pub struct Codec;

impl Codec {
    /// Encode a message to bytes with length prefix.
    pub fn encode(msg: &Message) -> Result<Bytes> {
        let payload = bincode::serialize(msg).map_err(|e| Error::Codec {
            message: format!("serialization failed: {}", e),
        })?;

        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(Error::Codec {
                message: format!(
                    "message too large: {} bytes (max {})",
                    payload.len(),
                    MAX_MESSAGE_SIZE
                ),
            });
        }

        let len = payload.len() as u32;
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
        buf.put_u32_le(len);
        buf.put_slice(&payload);

        Ok(buf.freeze())
    }

    /// Extract one complete frame payload from the buffer.
    ///
    /// Returns:
    /// - Ok(Some(payload)) if a complete frame was available (buffer advanced)
    /// - Ok(None) if more data is needed (buffer unchanged)
    /// - Err if the declared length violates framing limits
    pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        // Peek the length without consuming
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(Error::Codec {
                message: format!("frame length {} exceeds maximum {}", len, MAX_MESSAGE_SIZE),
            });
        }

        if buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_LEN);
        trace!(len, "frame extracted");
        Ok(Some(buf.split_to(len).freeze()))
    }

    /// Decode a message from one frame payload.
    pub fn decode_message(payload: &[u8]) -> Result<Message> {
        bincode::deserialize(payload).map_err(|e| Error::Schema {
            message: format!("deserialization failed: {}", e),
        })
    }

    /// Decode a message from a buffer, combining framing and deserialization.
    ///
    /// Note that on a schema error the offending frame has already been
    /// consumed, so the caller may keep decoding.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Message>> {
        match Self::decode_frame(buf)? {
            Some(payload) => Ok(Some(Self::decode_message(&payload)?)),
            None => Ok(None),
        }
    }

    /// Decode from a slice (convenience for testing).
    pub fn decode_slice(data: &[u8]) -> Result<Option<Message>> {
        let mut buf = BytesMut::from(data);
        Self::decode(&mut buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ConnectPayload, ConnectedPayload, ErrorPayload, GetListPayload, GetListReplyPayload,
        NodeId, QueryErrorPayload,
    };

    fn sample_connect() -> Message {
        Message::Connect(ConnectPayload {
            protocol_version: 1,
            client_name: "carve".into(),
            client_version: "0.1.0".into(),
            client_description: "test client".into(),
            client_type: "carve-test".into(),
            quit_on_close: false,
        })
    }

    #[test]
    fn encode_decode_roundtrip_connect() {
        let msg = sample_connect();
        let encoded = Codec::encode(&msg).unwrap();
        let decoded = Codec::decode_slice(&encoded).unwrap().unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn encode_decode_roundtrip_get_list_reply() {
        let mut bytes = [0u8; 24];
        bytes[0] = 1;
        let child = NodeId::from_bytes(bytes);

        let msg = Message::GetListReply(GetListReplyPayload {
            qid: 3,
            parent: NodeId::ROOT,
            children: vec![child],
        });

        let encoded = Codec::encode(&msg).unwrap();
        let decoded = Codec::decode_slice(&encoded).unwrap().unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn encode_decode_roundtrip_query_error() {
        let msg = Message::QueryError(QueryErrorPayload {
            qid: 7,
            code: "E_NOENT".into(),
            msg: "not found".into(),
        });
        let encoded = Codec::encode(&msg).unwrap();
        let decoded = Codec::decode_slice(&encoded).unwrap().unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn decode_partial_returns_none() {
        let encoded = Codec::encode(&sample_connect()).unwrap();
        let partial = &encoded[..encoded.len() / 2];
        assert!(Codec::decode_slice(partial).unwrap().is_none());
    }

    #[test]
    fn decode_empty_returns_none() {
        assert!(Codec::decode_slice(&[]).unwrap().is_none());
    }

    #[test]
    fn decode_header_only_returns_none() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(100);
        assert!(Codec::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_length_too_large_returns_error() {
        let mut buf = BytesMut::new();
        buf.put_u32_le((MAX_MESSAGE_SIZE + 1) as u32);
        buf.put_slice(&[0u8; 100]);

        let err = Codec::decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
    }

    #[test]
    fn schema_error_consumes_only_the_bad_frame() {
        let mut buf = BytesMut::new();
        // A frame of garbage that won't deserialize...
        buf.put_u32_le(10);
        buf.put_slice(&[0xFF; 10]);
        // ...followed by a valid frame.
        let good = Codec::encode(&Message::Connected(ConnectedPayload {
            protocol_version: 1,
        }))
        .unwrap();
        buf.extend_from_slice(&good);

        let err = Codec::decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(err.is_per_frame());

        // The stream stays aligned; the next decode succeeds.
        let decoded = Codec::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.tag(), "connected");
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_creates_length_prefix() {
        let encoded = Codec::encode(&sample_connect()).unwrap();
        let len = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        assert_eq!(len, encoded.len() - FRAME_HEADER_LEN);
    }

    #[test]
    fn multiple_messages_in_buffer() {
        let msg1 = sample_connect();
        let msg2 = Message::Connected(ConnectedPayload {
            protocol_version: 1,
        });
        let msg3 = Message::ProtoError(ErrorPayload {
            code: "E_PROTO".into(),
            msg: "bad".into(),
        });

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Codec::encode(&msg1).unwrap());
        buf.extend_from_slice(&Codec::encode(&msg2).unwrap());
        buf.extend_from_slice(&Codec::encode(&msg3).unwrap());

        assert_eq!(Codec::decode(&mut buf).unwrap().unwrap(), msg1);
        assert_eq!(Codec::decode(&mut buf).unwrap().unwrap(), msg2);
        assert_eq!(Codec::decode(&mut buf).unwrap().unwrap(), msg3);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_advances_buffer_only_on_complete_frame() {
        let msg = Message::GetList(GetListPayload {
            qid: 1,
            id: NodeId::ROOT,
        });
        let encoded = Codec::encode(&msg).unwrap();

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        let partial_len = buf.len();

        assert!(Codec::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), partial_len);

        buf.put_u8(encoded[encoded.len() - 1]);
        let _ = Codec::decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
    }
}
