//! The classic protocol engine: codecs, packet types, the opcode registry,
//! extension negotiation and the frame reader.

pub const PROTOCOL_VERSION: u8 = 7;

/// Sent in the identification's last byte by clients that support
/// extension negotiation.
pub const EXTENSION_MAGIC: u8 = 0x42;

/// Width of every string field on the wire.
pub const STRING_LENGTH: usize = 64;

pub mod capability;
pub mod code_page;
mod decoder;
mod encoder;
pub mod fixed_point;
pub mod frame_reader;
pub mod layout;
pub mod packet;
pub mod registry;

pub use decoder::{Decode, DecodeError, Decoder};
pub use encoder::{Encode, Encoder};
