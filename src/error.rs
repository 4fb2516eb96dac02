//! Errors that end a connection.
//!
//! Every variant is scoped to one connection. The connection task turns it
//! into a close (with a disconnect reason where the peer can still be told)
//! and a categorized log line; nothing escapes to the accept loop.

use crate::protocol::{capability::HandshakeError, registry::FramingError, DecodeError};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport failure. Not retried.
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("Malformed {packet} packet: {source}")]
    Decode {
        packet: String,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    /// A collaborator failed while handling a packet.
    #[error("Error handling {packet}: {source}")]
    Resolve {
        packet: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ConnectionError {
    /// Log category of the error.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "TransportError",
            Self::Framing(FramingError::UnknownOpcode(_)) => "UnknownOpcode",
            Self::Framing(FramingError::InvalidSize { .. }) => "InvalidSize",
            Self::Decode { .. } => "DecodeError",
            Self::Handshake(_) => "HandshakeMismatch",
            Self::Resolve { .. } => "ResolveError",
        }
    }

    /// Text to send in a `Disconnect` packet, or `None` if the peer
    /// can no longer be reached.
    pub fn disconnect_reason(&self) -> Option<String> {
        match self {
            Self::Io(_) => None,
            Self::Framing(e) => Some(e.to_string()),
            Self::Decode { packet, .. } => Some(format!("Malformed {packet} packet")),
            Self::Handshake(e) => Some(e.to_string()),
            Self::Resolve { .. } => Some("Internal server error".to_owned()),
        }
    }
}
