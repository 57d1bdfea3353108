//! carve-core: Shared library for the carve remote-analysis protocol.
//!
//! This crate provides:
//! - Protocol message definitions and wire format codec
//! - Node identifier and attribute value types
//! - Error types
//! - Logging setup
//! - Protocol and configuration constants

pub mod constants;
pub mod error;
pub mod logging;
pub mod protocol;

pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
