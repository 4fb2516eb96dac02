//! Packets sent by the server.

use super::extension::{CustomBlockSupportLevel, ExtEntry, ExtInfo, TwoWayPing};
use crate::{
    entity_id::EntityId,
    position::{BlockId, BlockPosition, EntityPosition, Orientation, PositionDelta},
    protocol::{
        layout::{FieldLayout, LevelEncoding},
        Decode, DecodeError, Decoder, Encode, Encoder,
    },
};
use classic_server_macros::{Decode, Encode, FromVariants};

/// Length of the data field of a level chunk.
pub const LEVEL_CHUNK_LENGTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Encode, Decode, strum::AsRefStr, FromVariants)]
#[encoding(discriminant = "byte")]
pub enum ServerPacket {
    #[encoding(id = 0x00)]
    ServerIdentification(ServerIdentification),
    #[encoding(id = 0x01)]
    Ping,
    #[encoding(id = 0x02)]
    LevelInitialize(LevelInitialize),
    #[encoding(id = 0x03)]
    LevelDataChunk(LevelDataChunk),
    #[encoding(id = 0x04)]
    LevelFinalize(LevelFinalize),
    #[encoding(id = 0x06)]
    SetBlock(SetBlock),
    #[encoding(id = 0x07)]
    SpawnPlayer(SpawnPlayer),
    #[encoding(id = 0x08)]
    Teleport(Teleport),
    #[encoding(id = 0x09)]
    PositionAndOrientationUpdate(PositionAndOrientationUpdate),
    #[encoding(id = 0x0a)]
    PositionUpdate(PositionUpdate),
    #[encoding(id = 0x0b)]
    OrientationUpdate(OrientationUpdate),
    #[encoding(id = 0x0c)]
    DespawnPlayer(DespawnPlayer),
    #[encoding(id = 0x0d)]
    Message(Message),
    #[encoding(id = 0x0e)]
    Disconnect(Disconnect),
    #[encoding(id = 0x0f)]
    UpdateUserType(UpdateUserType),
    #[encoding(id = 0x10)]
    ExtInfo(ExtInfo),
    #[encoding(id = 0x11)]
    ExtEntry(ExtEntry),
    #[encoding(id = 0x13)]
    CustomBlockSupportLevel(CustomBlockSupportLevel),
    #[encoding(id = 0x2b)]
    TwoWayPing(TwoWayPing),
}

impl ServerPacket {
    /// Encodes the full frame (opcode included) for a peer with the given layout.
    pub fn to_frame(&self, layout: FieldLayout) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut Encoder::new(&mut buf, layout));
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ServerIdentification {
    pub protocol_version: u8,
    pub name: String,
    pub motd: String,
    /// 0x64 for operators, 0x00 otherwise.
    pub user_type: u8,
}

/// Starts a level transfer. Peers that negotiated `FastMap` also receive
/// the block count up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelInitialize {
    pub volume: u32,
}

impl Encode for LevelInitialize {
    fn encode(&self, encoder: &mut Encoder) {
        if encoder.layout().level == LevelEncoding::Deflate {
            encoder.write_i32(bytemuck::cast(self.volume));
        }
    }
}

impl Decode for LevelInitialize {
    fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let volume = match decoder.layout().level {
            LevelEncoding::Deflate => bytemuck::cast(decoder.read_i32()?),
            LevelEncoding::Gzip => 0,
        };
        Ok(Self { volume })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LevelDataChunk {
    pub length: u16,
    #[encoding(blob = 1024)]
    pub data: Vec<u8>,
    pub percent_complete: u8,
}

impl LevelDataChunk {
    /// The meaningful part of `data`.
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.length).min(self.data.len())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct LevelFinalize {
    pub width: i16,
    pub height: i16,
    pub length: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct SetBlock {
    pub position: BlockPosition,
    pub block: BlockId,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SpawnPlayer {
    pub id: EntityId,
    pub name: String,
    pub position: EntityPosition,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct Teleport {
    pub id: EntityId,
    pub position: EntityPosition,
    pub orientation: Orientation,
}

/// Relative move plus new orientation.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct PositionAndOrientationUpdate {
    pub id: EntityId,
    pub delta: PositionDelta,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct PositionUpdate {
    pub id: EntityId,
    pub delta: PositionDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct OrientationUpdate {
    pub id: EntityId,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DespawnPlayer {
    pub id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    pub sender: EntityId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Disconnect {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct UpdateUserType {
    pub user_type: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::layout::CoordEncoding;

    fn fast_map() -> FieldLayout {
        FieldLayout {
            level: LevelEncoding::Deflate,
            ..FieldLayout::CLASSIC
        }
    }

    fn round_trip(packet: &ServerPacket, layout: FieldLayout) -> ServerPacket {
        let frame = packet.to_frame(layout);
        let mut decoder = Decoder::new(&frame, layout);
        let decoded = ServerPacket::decode(&mut decoder).unwrap();
        decoder.finish().unwrap();
        decoded
    }

    fn samples() -> Vec<ServerPacket> {
        let position = EntityPosition::new(32.5, 33.59375, -7.0);
        let orientation = Orientation {
            yaw: 0.0,
            pitch: 90.0,
        };
        vec![
            ServerIdentification {
                protocol_version: 7,
                name: "Server".into(),
                motd: "Welcome".into(),
                user_type: 0x64,
            }
            .into(),
            ServerPacket::Ping,
            LevelDataChunk {
                length: 3,
                data: {
                    let mut data = vec![1, 2, 3];
                    data.resize(LEVEL_CHUNK_LENGTH, 0);
                    data
                },
                percent_complete: 100,
            }
            .into(),
            LevelFinalize {
                width: 64,
                height: 32,
                length: 64,
            }
            .into(),
            SetBlock {
                position: BlockPosition::new(1, 2, 3),
                block: BlockId::STONE,
            }
            .into(),
            SpawnPlayer {
                id: EntityId::SELF,
                name: "alice".into(),
                position,
                orientation,
            }
            .into(),
            Teleport {
                id: EntityId::new(4),
                position,
                orientation,
            }
            .into(),
            PositionAndOrientationUpdate {
                id: EntityId::new(4),
                delta: PositionDelta {
                    dx: 0.5,
                    dy: -0.25,
                    dz: 3.96875,
                },
                orientation,
            }
            .into(),
            PositionUpdate {
                id: EntityId::new(4),
                delta: PositionDelta::default(),
            }
            .into(),
            OrientationUpdate {
                id: EntityId::new(4),
                orientation,
            }
            .into(),
            DespawnPlayer {
                id: EntityId::new(4),
            }
            .into(),
            Message {
                sender: EntityId::new(2),
                text: "&ehello".into(),
            }
            .into(),
            Disconnect {
                reason: "bye".into(),
            }
            .into(),
            UpdateUserType { user_type: 0 }.into(),
            ExtInfo {
                app_name: "classic-server".into(),
                extension_count: 2,
            }
            .into(),
            ExtEntry {
                extension_name: "FullCP437".into(),
                version: 1,
            }
            .into(),
            CustomBlockSupportLevel { level: 1 }.into(),
            TwoWayPing {
                direction: TwoWayPing::FROM_SERVER,
                data: -5,
            }
            .into(),
        ]
    }

    #[test]
    fn every_packet_round_trips() {
        let extended = FieldLayout {
            coords: CoordEncoding::Extended,
            ..FieldLayout::CLASSIC
        };
        for layout in [FieldLayout::CLASSIC, extended] {
            for packet in samples() {
                assert_eq!(round_trip(&packet, layout), packet, "{}", packet.as_ref());
            }
        }
    }

    #[test]
    fn frame_sizes_match_protocol() {
        let sizes: Vec<_> = samples()
            .iter()
            .map(|p| (p.as_ref().to_owned(), p.to_frame(FieldLayout::CLASSIC).len()))
            .collect();
        let expected = [
            ("ServerIdentification", 131),
            ("Ping", 1),
            ("LevelDataChunk", 1028),
            ("LevelFinalize", 7),
            ("SetBlock", 8),
            ("SpawnPlayer", 74),
            ("Teleport", 10),
            ("PositionAndOrientationUpdate", 7),
            ("PositionUpdate", 5),
            ("OrientationUpdate", 4),
            ("DespawnPlayer", 2),
            ("Message", 66),
            ("Disconnect", 65),
            ("UpdateUserType", 2),
            ("ExtInfo", 67),
            ("ExtEntry", 69),
            ("CustomBlockSupportLevel", 2),
            ("TwoWayPing", 4),
        ];
        assert_eq!(sizes.len(), expected.len());
        for ((name, size), (expected_name, expected_size)) in sizes.iter().zip(expected) {
            assert_eq!(name, expected_name);
            assert_eq!(*size, expected_size, "{name}");
        }
    }

    #[test]
    fn level_initialize_carries_volume_only_with_fast_map() {
        let packet = ServerPacket::from(LevelInitialize { volume: 131_072 });
        assert_eq!(packet.to_frame(FieldLayout::CLASSIC), [0x02]);
        assert_eq!(
            packet.to_frame(fast_map()),
            [0x02, 0x00, 0x02, 0x00, 0x00]
        );
        assert_eq!(round_trip(&packet, fast_map()), packet);
    }
}
