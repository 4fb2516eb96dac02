//! Splits an inbound byte stream into frames.

use crate::{
    error::ConnectionError,
    protocol::{
        capability::CapabilitySet,
        registry::{PacketDescriptor, PacketRegistry},
    },
};

/// Receives complete frames from a [`FrameReader`].
pub trait FrameSink {
    /// Capabilities in effect for the next frame. Consulted before every
    /// frame, so a handshake finishing mid-batch changes the sizes of the
    /// frames after it.
    fn capabilities(&self) -> &CapabilitySet;

    /// Handles one frame, opcode byte included, with the descriptor that
    /// sized it.
    fn dispatch(
        &mut self,
        descriptor: &PacketDescriptor,
        frame: &[u8],
    ) -> Result<(), ConnectionError>;

    /// Once this returns `true`, no further frames are extracted.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Per-connection accumulator of bytes not yet assembled into a frame.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Appends `data` and dispatches every frame that is now complete.
    /// Leftover bytes are kept for the next call. Returns the number of
    /// frames dispatched. Stops early when the sink closes; whatever is
    /// left in the buffer is never dispatched.
    ///
    /// An error invalidates the stream; the reader should be dropped.
    pub fn append(
        &mut self,
        data: &[u8],
        registry: &PacketRegistry,
        sink: &mut impl FrameSink,
    ) -> Result<usize, ConnectionError> {
        self.buffer.extend_from_slice(data);

        let mut cursor = 0;
        let mut dispatched = 0;
        while let Some(&opcode) = self.buffer.get(cursor) {
            if sink.is_closed() {
                break;
            }
            let (descriptor, size) = registry.lookup(opcode, sink.capabilities())?;
            let remaining = self.buffer.len() - cursor;
            if remaining < size {
                break;
            }

            sink.dispatch(&descriptor, &self.buffer[cursor..cursor + size])?;
            cursor += size;
            dispatched += 1;
        }

        if cursor > 0 {
            // Copy the partial frame out so the buffer does not keep the
            // capacity of every historical read.
            self.buffer = self.buffer[cursor..].to_vec();
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        capability::EXT_ENTITY_POSITIONS,
        packet::client::opcode,
        registry::{FramingError, PacketDescriptor},
    };

    #[derive(Default)]
    struct Recorder {
        capabilities: CapabilitySet,
        frames: Vec<Vec<u8>>,
        /// Close after this many frames.
        close_after: Option<usize>,
    }

    impl FrameSink for Recorder {
        fn capabilities(&self) -> &CapabilitySet {
            &self.capabilities
        }

        fn dispatch(
            &mut self,
            descriptor: &PacketDescriptor,
            frame: &[u8],
        ) -> Result<(), ConnectionError> {
            assert_eq!(descriptor.opcode, frame[0]);
            // a frame carrying 0xEE in TwoWayPing data turns on extended positions
            if frame[0] == opcode::TWO_WAY_PING && frame[3] == 0xEE {
                self.capabilities.add(EXT_ENTITY_POSITIONS, 1);
            }
            self.frames.push(frame.to_vec());
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.close_after
                .is_some_and(|limit| self.frames.len() >= limit)
        }
    }

    fn frame(opcode: u8, size: usize, fill: u8) -> Vec<u8> {
        let mut frame = vec![fill; size];
        frame[0] = opcode;
        frame
    }

    fn stream() -> Vec<u8> {
        stream_frames().concat()
    }

    fn stream_frames() -> Vec<Vec<u8>> {
        vec![
            frame(opcode::MESSAGE, 66, b'a'),
            frame(opcode::TWO_WAY_PING, 4, 0x01),
            frame(opcode::POSITION_AND_ORIENTATION, 10, 0x02),
            frame(opcode::TWO_WAY_PING, 4, 0xEE),
            frame(opcode::POSITION_AND_ORIENTATION, 16, 0x03),
            frame(opcode::SET_BLOCK, 9, 0x04),
        ]
    }

    #[test]
    fn split_invariance() {
        let registry = PacketRegistry::with_defaults();
        let bytes = stream();

        let mut whole = Recorder::default();
        let mut reader = FrameReader::new();
        assert_eq!(reader.append(&bytes, &registry, &mut whole).unwrap(), 6);
        assert_eq!(reader.pending(), 0);

        let mut bytewise = Recorder::default();
        let mut reader = FrameReader::new();
        for byte in &bytes {
            reader.append(std::slice::from_ref(byte), &registry, &mut bytewise).unwrap();
        }
        assert_eq!(reader.pending(), 0);

        assert_eq!(whole.frames, bytewise.frames);
        assert_eq!(whole.frames.concat(), bytes);
        assert_eq!(whole.frames[4].len(), 16);
    }

    #[test]
    fn partial_frames_are_retained_verbatim() {
        let registry = PacketRegistry::with_defaults();
        let bytes = frame(opcode::MESSAGE, 66, b'z');
        let mut sink = Recorder::default();
        let mut reader = FrameReader::new();

        assert_eq!(reader.append(&bytes[..40], &registry, &mut sink).unwrap(), 0);
        assert_eq!(reader.pending(), 40);
        let mut second = bytes[40..].to_vec();
        second.extend_from_slice(&bytes[..1]);
        assert_eq!(reader.append(&second, &registry, &mut sink).unwrap(), 1);
        assert_eq!(reader.pending(), 1);
        assert_eq!(sink.frames, vec![bytes]);
    }

    #[test]
    fn unknown_opcode_fails_even_after_good_frames() {
        let registry = PacketRegistry::with_defaults();
        let mut bytes = frame(opcode::TWO_WAY_PING, 4, 0);
        bytes.push(0xFF);
        let mut sink = Recorder::default();
        let err = FrameReader::new()
            .append(&bytes, &registry, &mut sink)
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Framing(FramingError::UnknownOpcode(0xFF))
        ));
        assert_eq!(sink.frames.len(), 1);
    }

    #[test]
    fn closing_stops_extraction_mid_batch() {
        let registry = PacketRegistry::with_defaults();
        let mut sink = Recorder {
            close_after: Some(2),
            ..Recorder::default()
        };
        let mut bytes = stream();
        // an unknown opcode after the close point must not even be sized
        bytes.push(0xFF);

        let dispatched = FrameReader::new()
            .append(&bytes, &registry, &mut sink)
            .unwrap();
        assert_eq!(dispatched, 2);
        assert_eq!(sink.frames, stream_frames()[..2].to_vec());
    }

    #[test]
    fn zero_size_is_invalid() {
        let registry = PacketRegistry::new();
        registry.register(PacketDescriptor::raw(0x70, "Empty", 0));
        let err = FrameReader::new()
            .append(&[0x70], &registry, &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Framing(FramingError::InvalidSize { opcode: 0x70, .. })
        ));
    }

    #[test]
    fn same_bytes_differ_by_capability_set() {
        let registry = PacketRegistry::with_defaults();
        let bytes = frame(opcode::POSITION_AND_ORIENTATION, 16, 0);

        let mut classic = Recorder::default();
        let mut extended = Recorder::default();
        extended.capabilities.add(EXT_ENTITY_POSITIONS, 1);

        let mut classic_reader = FrameReader::new();
        let mut extended_reader = FrameReader::new();
        // classic reads a 10-byte frame, then 6 bytes of the next one (opcode 0)
        classic_reader.append(&bytes, &registry, &mut classic).unwrap();
        extended_reader.append(&bytes, &registry, &mut extended).unwrap();

        assert_eq!(classic.frames, vec![bytes[..10].to_vec()]);
        assert_eq!(classic_reader.pending(), 6);
        assert_eq!(extended.frames, vec![bytes.clone()]);
        assert_eq!(extended_reader.pending(), 0);
    }
}
