use crate::protocol::{
    code_page,
    fixed_point::{from_fbyte, from_fint, from_fshort, from_ranged_byte},
    layout::{BlockIdEncoding, CoordEncoding, FieldLayout},
    STRING_LENGTH,
};

/// An error while decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Need at least {0} more bytes")]
    EndOfStream(usize),
    #[error("{0} bytes left over after decoding")]
    TrailingBytes(usize),
    #[error("Invalid discriminant {0}")]
    InvalidDiscriminant(i64),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// A raw decoder over one frame body.
#[derive(Debug)]
pub struct Decoder<'a> {
    buffer: &'a [u8],
    layout: FieldLayout,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder from the buffer it will read from and the
    /// field layout negotiated for the connection.
    pub fn new(buffer: &'a [u8], layout: FieldLayout) -> Self {
        Self { buffer, layout }
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Gets the remaining buffer.
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns if there is no data left in the buffer.
    pub fn is_finished(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Fails if any bytes remain.
    pub fn finish(&self) -> Result<()> {
        if self.is_finished() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes(self.buffer.len()))
        }
    }

    /// Consumes `n` bytes from the buffer, returning them as a slice.
    pub fn consume_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if n <= self.buffer.len() {
            let (data, buffer) = self.buffer.split_at(n);
            self.buffer = buffer;
            Ok(data)
        } else {
            Err(DecodeError::EndOfStream(n - self.buffer.len()))
        }
    }

    /// Consumes `N` bytes into an array.
    pub fn consume<const N: usize>(&mut self) -> Result<[u8; N]> {
        let data = self.consume_slice(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(data);
        Ok(array)
    }

    /// Reads an unsigned byte from the stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.consume::<1>().map(|[x]| x)
    }

    /// Reads a signed byte from the stream.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.consume().map(i8::from_be_bytes)
    }

    /// Reads an unsigned short from the stream.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.consume().map(u16::from_be_bytes)
    }

    /// Reads a signed short from the stream.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.consume().map(i16::from_be_bytes)
    }

    /// Reads a signed int from the stream.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.consume().map(i32::from_be_bytes)
    }

    pub fn read_fshort(&mut self) -> Result<f32> {
        self.read_i16().map(from_fshort)
    }

    pub fn read_fbyte(&mut self) -> Result<f32> {
        self.read_i8().map(from_fbyte)
    }

    /// Reads one entity coordinate in the negotiated width.
    pub fn read_coord(&mut self) -> Result<f32> {
        match self.layout.coords {
            CoordEncoding::FShort => self.read_fshort(),
            CoordEncoding::Extended => self.read_i32().map(from_fint),
        }
    }

    /// Reads a block id in the negotiated width.
    pub fn read_block_id(&mut self) -> Result<u16> {
        match self.layout.block_ids {
            BlockIdEncoding::Byte => self.read_u8().map(u16::from),
            BlockIdEncoding::Wide => self.read_u16(),
        }
    }

    /// Reads a byte mapped onto `min..=max`.
    pub fn read_ranged(&mut self, min: f32, max: f32) -> Result<f32> {
        self.read_i8().map(|raw| from_ranged_byte(raw, min, max))
    }

    /// Reads a yaw in degrees.
    pub fn read_angle(&mut self) -> Result<f32> {
        self.read_ranged(0.0, 360.0)
    }

    /// Reads a pitch in degrees.
    pub fn read_pitch(&mut self) -> Result<f32> {
        self.read_ranged(-90.0, 90.0)
    }

    /// Reads a fixed-length string, trimming the space padding.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.consume_slice(STRING_LENGTH)?;
        let text: String = bytes.iter().map(|&b| code_page::decode_byte(b)).collect();
        Ok(text.trim_end_matches(' ').to_owned())
    }

    /// Reads a fixed-length byte array.
    pub fn read_blob(&mut self, length: usize) -> Result<Vec<u8>> {
        self.consume_slice(length).map(<[u8]>::to_vec)
    }
}

/// A type that can be read from a [`Decoder`].
pub trait Decode: Sized {
    fn decode(decoder: &mut Decoder) -> Result<Self>;
}

impl Decode for u8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u8()
    }
}

impl Decode for i8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i8()
    }
}

impl Decode for u16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u16()
    }
}

impl Decode for i16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i16()
    }
}

impl Decode for i32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i32()
    }
}

impl Decode for String {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_string()
    }
}

impl Decode for () {
    fn decode(_decoder: &mut Decoder) -> Result<Self> {
        Ok(())
    }
}
