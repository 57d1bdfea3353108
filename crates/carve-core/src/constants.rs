//! Protocol and configuration constants for carve.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Current protocol version, sent in the connect handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Authentication key length on the wire. User-supplied keys are
/// right-zero-padded (or truncated) to exactly this many bytes.
pub const AUTH_KEY_LEN: usize = 64;

/// Node identifier width in bytes.
pub const NODE_ID_LEN: usize = 24;

/// Maximum message payload size (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Defaults
// =============================================================================

/// Default analysis server host.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default analysis server port.
pub const DEFAULT_SERVER_PORT: u16 = 3135;

/// Default TCP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client version string used when the host application supplies none.
pub const UNSPECIFIED_VERSION: &str = "[unspecified version]";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_key_is_64_bytes() {
        assert_eq!(AUTH_KEY_LEN, 64);
    }

    #[test]
    fn node_id_width() {
        assert_eq!(NODE_ID_LEN, 24);
    }

    #[test]
    fn default_port_is_unprivileged() {
        assert!(DEFAULT_SERVER_PORT > 1024);
    }
}
