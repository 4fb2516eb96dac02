//! Selects the wire form of layout-dependent fields from the negotiated
//! capability set.
//!
//! The layout is resolved once when a packet starts decoding or encoding
//! and is carried by the `Decoder`/`Encoder`, so field codecs never look at
//! capabilities themselves.

use crate::protocol::{
    capability::{self, CapabilitySet},
    code_page::TextEncoding,
};

/// Encoding of entity coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CoordEncoding {
    /// 16-bit fixed point.
    #[default]
    FShort,
    /// 32-bit fixed point.
    Extended,
}

/// Encoding of block ids.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockIdEncoding {
    #[default]
    Byte,
    /// Two bytes, big-endian.
    Wide,
}

/// Compression of level data.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LevelEncoding {
    /// Gzip of the volume-prefixed block array.
    #[default]
    Gzip,
    /// Raw deflate of the blocks; the volume travels in `LevelInitialize`.
    Deflate,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldLayout {
    pub coords: CoordEncoding,
    pub block_ids: BlockIdEncoding,
    pub text: TextEncoding,
    pub level: LevelEncoding,
}

type Adjustment = fn(&mut FieldLayout);

/// Capability name → how it changes the layout.
const LAYOUT_TABLE: &[(&str, Adjustment)] = &[
    (capability::EXT_ENTITY_POSITIONS, extended_coords),
    (capability::EXTENDED_BLOCKS, wide_block_ids),
    (capability::FULL_CP437, full_code_page),
    (capability::FAST_MAP, deflate_level),
];

fn extended_coords(layout: &mut FieldLayout) {
    layout.coords = CoordEncoding::Extended;
}

fn wide_block_ids(layout: &mut FieldLayout) {
    layout.block_ids = BlockIdEncoding::Wide;
}

fn full_code_page(layout: &mut FieldLayout) {
    layout.text = TextEncoding::FullCodePage;
}

fn deflate_level(layout: &mut FieldLayout) {
    layout.level = LevelEncoding::Deflate;
}

impl FieldLayout {
    /// Layout of a connection that negotiated nothing.
    pub const CLASSIC: FieldLayout = FieldLayout {
        coords: CoordEncoding::FShort,
        block_ids: BlockIdEncoding::Byte,
        text: TextEncoding::Restricted,
        level: LevelEncoding::Gzip,
    };

    pub fn resolve(capabilities: &CapabilitySet) -> Self {
        let mut layout = Self::CLASSIC;
        for (name, adjust) in LAYOUT_TABLE {
            if capabilities.supports(name) {
                adjust(&mut layout);
            }
        }
        layout
    }
}
