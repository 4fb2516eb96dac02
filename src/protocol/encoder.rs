use crate::protocol::{
    code_page,
    fixed_point::{to_fbyte, to_fint, to_fshort, to_ranged_byte},
    layout::{BlockIdEncoding, CoordEncoding, FieldLayout},
    STRING_LENGTH,
};

/// A raw encoder for the classic byte stream.
#[derive(Debug)]
pub struct Encoder<'a> {
    buffer: &'a mut Vec<u8>,
    layout: FieldLayout,
}

impl<'a> Encoder<'a> {
    /// Creates an encoder that will append to the provided
    /// byte buffer, using the field layout of the receiving peer.
    ///
    /// Any existing contents of `buffer` are left untouched.
    pub fn new(buffer: &'a mut Vec<u8>, layout: FieldLayout) -> Self {
        Self { buffer, layout }
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Writes an unsigned byte to the stream.
    pub fn write_u8(&mut self, x: u8) {
        self.buffer.push(x);
    }

    /// Writes a signed byte to the stream.
    pub fn write_i8(&mut self, x: i8) {
        self.write_u8(bytemuck::cast(x));
    }

    /// Writes an unsigned short to the stream.
    pub fn write_u16(&mut self, x: u16) {
        self.buffer.extend(x.to_be_bytes());
    }

    /// Writes a signed short to the stream.
    pub fn write_i16(&mut self, x: i16) {
        self.buffer.extend(x.to_be_bytes());
    }

    /// Writes a signed int to the stream.
    pub fn write_i32(&mut self, x: i32) {
        self.buffer.extend(x.to_be_bytes());
    }

    pub fn write_fshort(&mut self, x: f32) {
        self.write_i16(to_fshort(x));
    }

    pub fn write_fbyte(&mut self, x: f32) {
        self.write_i8(to_fbyte(x));
    }

    /// Writes one entity coordinate in the negotiated width.
    pub fn write_coord(&mut self, x: f32) {
        match self.layout.coords {
            CoordEncoding::FShort => self.write_fshort(x),
            CoordEncoding::Extended => self.write_i32(to_fint(x)),
        }
    }

    /// Writes a block id in the negotiated width. Ids that do not fit a
    /// single byte are saturated when the peer only understands bytes.
    pub fn write_block_id(&mut self, id: u16) {
        match self.layout.block_ids {
            BlockIdEncoding::Byte => self.write_u8(u8::try_from(id).unwrap_or(u8::MAX)),
            BlockIdEncoding::Wide => self.write_u16(id),
        }
    }

    /// Writes a value in `min..=max` as a single byte.
    pub fn write_ranged(&mut self, value: f32, min: f32, max: f32) {
        self.write_i8(to_ranged_byte(value, min, max));
    }

    pub fn write_angle(&mut self, degrees: f32) {
        self.write_ranged(degrees, 0.0, 360.0);
    }

    pub fn write_pitch(&mut self, degrees: f32) {
        self.write_ranged(degrees, -90.0, 90.0);
    }

    /// Writes a fixed-length string: truncated to the field width,
    /// right-padded with spaces.
    pub fn write_string(&mut self, x: &str) {
        let text = self.layout.text;
        let start = self.buffer.len();
        self.buffer.extend(
            x.chars()
                .take(STRING_LENGTH)
                .map(|c| code_page::encode_char(c, text)),
        );
        self.buffer.resize(start + STRING_LENGTH, b' ');
    }

    /// Writes exactly `length` bytes: `data` truncated or zero-padded.
    pub fn write_blob(&mut self, data: &[u8], length: usize) {
        let start = self.buffer.len();
        self.buffer
            .extend_from_slice(&data[..data.len().min(length)]);
        self.buffer.resize(start + length, 0);
    }
}

/// A type that can be written to an [`Encoder`].
pub trait Encode {
    fn encode(&self, encoder: &mut Encoder);
}

impl Encode for u8 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(*self);
    }
}

impl Encode for i8 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i8(*self);
    }
}

impl Encode for u16 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u16(*self);
    }
}

impl Encode for i16 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i16(*self);
    }
}

impl Encode for i32 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i32(*self);
    }
}

impl Encode for String {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_string(self);
    }
}

impl Encode for () {
    fn encode(&self, _encoder: &mut Encoder) {}
}
