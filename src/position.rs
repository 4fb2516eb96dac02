use crate::protocol::{Decode, DecodeError, Decoder, Encode, Encoder};
use classic_server_macros::{Decode, Encode};
use std::ops::{Add, AddAssign};

/// Position of a block in the level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Encode, Decode)]
pub struct BlockPosition {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl BlockPosition {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Entity position standing on top of this block, centered.
    pub fn standing_on(self) -> EntityPosition {
        EntityPosition {
            x: f32::from(self.x) + 0.5,
            y: f32::from(self.y) + 1.0 + PLAYER_EYE_HEIGHT,
            z: f32::from(self.z) + 0.5,
        }
    }
}

/// Height of a player's eyes above their feet, in blocks. Entity positions
/// on the wire refer to the eyes.
pub const PLAYER_EYE_HEIGHT: f32 = 1.59375;

/// Entity position in blocks. On the wire each coordinate is either a
/// fixed-point short or, with extended positions negotiated, a fixed-point int.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct EntityPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl EntityPosition {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Encode for EntityPosition {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_coord(self.x);
        encoder.write_coord(self.y);
        encoder.write_coord(self.z);
    }
}

impl Decode for EntityPosition {
    fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            x: decoder.read_coord()?,
            y: decoder.read_coord()?,
            z: decoder.read_coord()?,
        })
    }
}

/// Relative movement, fixed-point bytes on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Default, Encode, Decode)]
pub struct PositionDelta {
    #[encoding(fbyte)]
    pub dx: f32,
    #[encoding(fbyte)]
    pub dy: f32,
    #[encoding(fbyte)]
    pub dz: f32,
}

impl PositionDelta {
    /// Largest movement per axis a delta can carry.
    pub const MAX: f32 = 127.0 / 32.0;

    /// The delta from `from` to `to`, if every axis fits.
    pub fn between(from: EntityPosition, to: EntityPosition) -> Option<Self> {
        let delta = Self {
            dx: to.x - from.x,
            dy: to.y - from.y,
            dz: to.z - from.z,
        };
        [delta.dx, delta.dy, delta.dz]
            .iter()
            .all(|d| (-Self::MAX - 1.0 / 32.0..=Self::MAX).contains(d))
            .then_some(delta)
    }
}

impl Add<PositionDelta> for EntityPosition {
    type Output = EntityPosition;

    fn add(self, rhs: PositionDelta) -> Self::Output {
        EntityPosition {
            x: self.x + rhs.dx,
            y: self.y + rhs.dy,
            z: self.z + rhs.dz,
        }
    }
}

impl AddAssign<PositionDelta> for EntityPosition {
    fn add_assign(&mut self, rhs: PositionDelta) {
        *self = *self + rhs;
    }
}

/// Facing direction in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Default, Encode, Decode)]
pub struct Orientation {
    #[encoding(angle)]
    pub yaw: f32,
    #[encoding(pitch)]
    pub pitch: f32,
}

/// A block type. One byte on the wire unless extended block ids
/// were negotiated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const STONE: BlockId = BlockId(1);
    pub const GRASS: BlockId = BlockId(2);
    pub const DIRT: BlockId = BlockId(3);
    pub const BEDROCK: BlockId = BlockId(7);

    /// Highest block of the base game.
    pub const MAX_CLASSIC: BlockId = BlockId(49);
    /// Highest block of custom block tier 1.
    pub const MAX_CUSTOM: BlockId = BlockId(65);

    /// The classic block shown to peers that lack custom block support.
    /// Blocks outside tier 1 are returned unchanged.
    pub fn fallback(self) -> BlockId {
        const TIER_ONE: [u16; 16] = [44, 39, 12, 0, 11, 33, 25, 3, 29, 28, 20, 42, 49, 36, 5, 1];
        match self.0.checked_sub(Self::MAX_CLASSIC.0 + 1) {
            Some(offset) if self <= Self::MAX_CUSTOM => BlockId(TIER_ONE[usize::from(offset)]),
            _ => self,
        }
    }
}


impl Encode for BlockId {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_block_id(self.0);
    }
}

impl Decode for BlockId {
    fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        decoder.read_block_id().map(BlockId)
    }
}
