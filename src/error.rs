//! Error types.
//!
//! Per-packet faults never surface as errors to the event loop: they are logged
//! and the packet is dropped. These types cover parsing and configuration.

use thiserror::Error;

/// Errors raised while parsing an IPv4 or TCP header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes than the fixed header or the total-length field needs.
    #[error("truncated {what}: need {needed} bytes, got {got}")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    /// Version nibble other than 4.
    #[error("unsupported IP version {0}")]
    BadVersion(u8),

    /// Header length field smaller than the fixed header or beyond the buffer.
    #[error("bad header length {0} (32-bit words)")]
    BadHeaderLen(u8),

    /// Total length field shorter than the header it claims to carry.
    #[error("bad total length {0}")]
    BadTotalLen(u16),
}

/// Errors raised while building a stack or a network from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid IPv4 address {0:?}")]
    InvalidAddress(String),

    #[error("invalid CIDR block {0:?}")]
    InvalidCidr(String),

    #[error("unknown node {0:?}")]
    UnknownNode(String),

    #[error("duplicate node {0:?}")]
    DuplicateNode(String),

    #[error("mss {0} out of range 1..={max}", max = crate::tcp::MAX_MSS)]
    InvalidMss(usize),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
