//! Packets sent by the client.

use super::{
    extension::{CustomBlockSupportLevel, ExtEntry, ExtInfo, TwoWayPing},
    RawPacket,
};
use crate::{
    entity_id::EntityId,
    position::{BlockId, BlockPosition, EntityPosition, Orientation},
    protocol::{Encode, Encoder, EXTENSION_MAGIC},
};
use classic_server_macros::{Decode, Encode, FromVariants};

pub mod opcode {
    pub const IDENTIFICATION: u8 = 0x00;
    pub const SET_BLOCK: u8 = 0x05;
    pub const POSITION_AND_ORIENTATION: u8 = 0x08;
    pub const MESSAGE: u8 = 0x0d;
    pub const EXT_INFO: u8 = 0x10;
    pub const EXT_ENTRY: u8 = 0x11;
    pub const CUSTOM_BLOCK_SUPPORT_LEVEL: u8 = 0x13;
    pub const PLAYER_CLICKED: u8 = 0x22;
    pub const TWO_WAY_PING: u8 = 0x2b;
}

/// A decoded client packet.
#[derive(Debug, Clone, PartialEq, strum::AsRefStr, strum::IntoStaticStr, FromVariants)]
pub enum ClientPacket {
    Identification(Identification),
    SetBlock(SetBlock),
    PositionAndOrientation(PositionAndOrientation),
    Message(Message),
    ExtInfo(ExtInfo),
    ExtEntry(ExtEntry),
    CustomBlockSupportLevel(CustomBlockSupportLevel),
    PlayerClicked(PlayerClicked),
    TwoWayPing(TwoWayPing),
    Custom(RawPacket),
}

impl ClientPacket {
    /// Variant name, for logs and error messages.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Identification(_) => opcode::IDENTIFICATION,
            Self::SetBlock(_) => opcode::SET_BLOCK,
            Self::PositionAndOrientation(_) => opcode::POSITION_AND_ORIENTATION,
            Self::Message(_) => opcode::MESSAGE,
            Self::ExtInfo(_) => opcode::EXT_INFO,
            Self::ExtEntry(_) => opcode::EXT_ENTRY,
            Self::CustomBlockSupportLevel(_) => opcode::CUSTOM_BLOCK_SUPPORT_LEVEL,
            Self::PlayerClicked(_) => opcode::PLAYER_CLICKED,
            Self::TwoWayPing(_) => opcode::TWO_WAY_PING,
            Self::Custom(raw) => raw.opcode,
        }
    }
}

impl Encode for ClientPacket {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(self.opcode());
        match self {
            Self::Identification(p) => p.encode(encoder),
            Self::SetBlock(p) => p.encode(encoder),
            Self::PositionAndOrientation(p) => p.encode(encoder),
            Self::Message(p) => p.encode(encoder),
            Self::ExtInfo(p) => p.encode(encoder),
            Self::ExtEntry(p) => p.encode(encoder),
            Self::CustomBlockSupportLevel(p) => p.encode(encoder),
            Self::PlayerClicked(p) => p.encode(encoder),
            Self::TwoWayPing(p) => p.encode(encoder),
            Self::Custom(raw) => encoder.write_blob(&raw.body, raw.body.len()),
        }
    }
}

/// First packet of every connection.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Identification {
    pub protocol_version: u8,
    pub username: String,
    pub verification_key: String,
    /// [`EXTENSION_MAGIC`] if the client wants to negotiate extensions.
    pub magic: u8,
}

impl Identification {
    pub fn requests_extensions(&self) -> bool {
        self.magic == EXTENSION_MAGIC
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SetBlock {
    pub position: BlockPosition,
    /// 0 = destroyed, 1 = created.
    pub mode: u8,
    pub block: BlockId,
}

impl SetBlock {
    pub fn is_destroy(&self) -> bool {
        self.mode == 0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Encode, Decode)]
pub struct PositionAndOrientation {
    /// `0xFF` (the player itself) for classic clients.
    pub held_block: u8,
    pub position: EntityPosition,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    /// Non-zero when more parts of a long message follow.
    pub partial: u8,
    pub text: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PlayerClicked {
    pub button: u8,
    pub action: u8,
    pub yaw: i16,
    pub pitch: i16,
    pub target_entity: EntityId,
    pub target_block: BlockPosition,
    pub target_face: u8,
}
