use crate::protocol::{Decode, DecodeError, Decoder, Encode, Encoder};

/// Wrapper for a network entity ID. `-1` always refers to the receiving
/// player itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityId(i8);

impl EntityId {
    /// The id a client uses for itself.
    pub const SELF: EntityId = EntityId(-1);

    pub fn new(id: i8) -> Self {
        Self(id)
    }

    pub fn as_i8(self) -> i8 {
        self.0
    }
}

impl Encode for EntityId {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i8(self.0);
    }
}

impl Decode for EntityId {
    fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        decoder.read_i8().map(Self)
    }
}
