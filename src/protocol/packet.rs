//! Packet types of the classic protocol.
//!
//! Every packet is a single opcode byte followed by a fixed-size body. The
//! body size of an inbound packet is known from its opcode and the
//! connection's negotiated extensions (see `registry`), so there is no
//! length prefix on the wire.

pub mod client;
pub mod extension;
pub mod server;

/// Body of a frame whose opcode was registered at runtime by a
/// collaborator. The engine only knows its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub opcode: u8,
    pub body: Vec<u8>,
}
