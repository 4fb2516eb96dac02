//! A server for the classic block-game protocol (version 7) with support
//! for negotiated protocol extensions.
//!
//! The protocol has no length prefix: every opcode has a fixed frame size,
//! and some extensions change the size of existing opcodes once they are
//! negotiated. The [`protocol`] module holds the engine that deals with
//! this: the codec primitives, the packet types, the opcode registry, the
//! extension negotiator and the frame reader.
//!
//! # Connection lifecycle
//! A connection starts in `Connecting` and must send an identification
//! packet first. If the identification carries the extension magic byte,
//! the server lists its extensions and both sides exchange `ExtInfo` and
//! `ExtEntry` packets until the client's announced count is reached; the
//! agreed set is then frozen and decides the field layout for the rest of
//! the connection. After that the connection is `Active`, and packets are
//! handed to the game logic through [`dispatcher::PacketHandler`].
//!
//! Any framing, decoding, handshake or handler error closes only the
//! connection it happened on, after telling the peer why where possible.

pub mod client_handle;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod entity_id;
pub mod error;
pub mod level;
pub mod lobby;
pub mod position;
pub mod protocol;
pub mod server;
pub mod session;
