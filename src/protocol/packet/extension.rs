//! Extension negotiation packets. Both sides send the same layout.

use classic_server_macros::{Decode, Encode};

/// Opens the extension handshake: who is talking and how many
/// `ExtEntry` packets follow.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ExtInfo {
    pub app_name: String,
    pub extension_count: u16,
}

/// One supported extension.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ExtEntry {
    pub extension_name: String,
    pub version: i32,
}

/// Highest custom block tier the sender understands.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CustomBlockSupportLevel {
    pub level: u8,
}

/// Round-trip ping. The side named by `direction` (0 = client initiated,
/// 1 = server initiated) echoes the packet back unchanged.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct TwoWayPing {
    pub direction: u8,
    pub data: i16,
}

impl TwoWayPing {
    pub const FROM_CLIENT: u8 = 0;
    pub const FROM_SERVER: u8 = 1;
}
