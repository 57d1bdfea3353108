//! Error types for carve-core.

use thiserror::Error;

/// Main error type for carve operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation reported by the server or detected locally.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Codec error during encoding/decoding.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Per-message schema error; the frame is dropped but the stream survives.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation attempted without an established connection.
    #[error("not connected")]
    NotConnected,

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    /// Returns true if this error only poisons the current frame, not the
    /// connection. The read loop logs these and attempts the next frame.
    pub fn is_per_frame(&self) -> bool {
        matches!(self, Error::Schema { .. })
    }

    /// Returns true if this error tears down the session. The caller is
    /// expected to end up in the not-connected state afterwards.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Codec { .. } | Error::Protocol { .. } | Error::ConnectionClosed
        )
    }
}

/// Convenience result type for carve operations.
pub type Result<T> = std::result::Result<T, Error>;
