//! Maps opcodes to packet descriptors.
//!
//! The classic protocol has no length prefix, so the registry is the only
//! source of truth for how many bytes a frame occupies. Sizes include the
//! opcode byte. Extensions may change the size of an existing opcode; those
//! changes are declared as overrides on the descriptor.

use crate::protocol::{
    capability::{self, CapabilitySet},
    packet::{
        client::{
            opcode, ClientPacket, Identification, Message, PlayerClicked,
            PositionAndOrientation, SetBlock,
        },
        extension::{CustomBlockSupportLevel, ExtEntry, ExtInfo, TwoWayPing},
        RawPacket,
    },
    Decode, DecodeError, Decoder,
};
use ahash::AHashMap;
use std::{
    borrow::Cow,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Builds a packet from a frame body.
pub type PacketFactory =
    Arc<dyn Fn(&mut Decoder) -> Result<ClientPacket, DecodeError> + Send + Sync + 'static>;

/// The stream could not be split into frames. Always fatal: without a
/// length prefix there is no way to resynchronize.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("Invalid frame size {size} for opcode 0x{opcode:02x}")]
    InvalidSize { opcode: u8, size: usize },
}

pub struct PacketDescriptor {
    pub opcode: u8,
    pub name: Cow<'static, str>,
    pub base_size: usize,
    /// Capability name → frame size, checked in declaration order.
    pub size_overrides: Vec<(Cow<'static, str>, usize)>,
    factory: PacketFactory,
}

impl PacketDescriptor {
    pub fn new(
        opcode: u8,
        name: impl Into<Cow<'static, str>>,
        base_size: usize,
        factory: impl Fn(&mut Decoder) -> Result<ClientPacket, DecodeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            opcode,
            name: name.into(),
            base_size,
            size_overrides: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    /// Descriptor for a typed packet decoded with its `Decode` impl.
    pub fn of<T>(opcode: u8, name: &'static str, base_size: usize) -> Self
    where
        T: Decode + Into<ClientPacket>,
    {
        Self::new(opcode, name, base_size, |decoder| {
            T::decode(decoder).map(Into::into)
        })
    }

    /// Descriptor for an opcode whose body is passed through untouched.
    pub fn raw(opcode: u8, name: impl Into<Cow<'static, str>>, base_size: usize) -> Self {
        Self::new(opcode, name, base_size, move |decoder| {
            let body = decoder.buffer().to_vec();
            decoder.consume_slice(body.len())?;
            Ok(ClientPacket::Custom(RawPacket { opcode, body }))
        })
    }

    pub fn with_override(mut self, capability: impl Into<Cow<'static, str>>, size: usize) -> Self {
        self.size_overrides.push((capability.into(), size));
        self
    }

    /// Frame size on a connection with the given capabilities. The first
    /// override whose capability is negotiated replaces the base size.
    pub fn frame_size(&self, capabilities: &CapabilitySet) -> usize {
        self.size_overrides
            .iter()
            .find(|(name, _)| capabilities.supports(name))
            .map_or(self.base_size, |&(_, size)| size)
    }

    /// Runs the factory over a frame body.
    pub fn construct(&self, decoder: &mut Decoder) -> Result<ClientPacket, DecodeError> {
        (self.factory)(decoder)
    }
}

impl fmt::Debug for PacketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketDescriptor")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("base_size", &self.base_size)
            .field("size_overrides", &self.size_overrides)
            .finish_non_exhaustive()
    }
}

/// Process-wide opcode table. Read on every frame, written rarely
/// (startup and collaborators extending the protocol).
#[derive(Debug, Default)]
pub struct PacketRegistry {
    descriptors: RwLock<AHashMap<u8, Arc<PacketDescriptor>>>,
}

impl PacketRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every inbound packet of the base protocol and the
    /// supported extensions.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for descriptor in default_descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    /// Registers a descriptor. A second registration for the same opcode is
    /// ignored; returns whether the descriptor was added.
    pub fn register(&self, descriptor: PacketDescriptor) -> bool {
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let opcode = descriptor.opcode;
        if let Some(existing) = descriptors.get(&opcode) {
            tracing::warn!(
                "Ignoring registration of {} for opcode 0x{opcode:02x}: already registered to {}",
                descriptor.name,
                existing.name
            );
            return false;
        }
        descriptors.insert(opcode, Arc::new(descriptor));
        true
    }

    pub fn unregister(&self, opcode: u8) -> Option<Arc<PacketDescriptor>> {
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&opcode)
    }

    pub fn descriptor(&self, opcode: u8) -> Option<Arc<PacketDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&opcode)
            .cloned()
    }

    /// Expected frame size for `opcode` under `capabilities`.
    pub fn resolve_size(
        &self,
        opcode: u8,
        capabilities: &CapabilitySet,
    ) -> Result<usize, FramingError> {
        self.lookup(opcode, capabilities).map(|(_, size)| size)
    }

    /// The descriptor for `opcode` together with its frame size, taken from
    /// one read of the table. A frame sized with this descriptor must be
    /// decoded with it too.
    pub fn lookup(
        &self,
        opcode: u8,
        capabilities: &CapabilitySet,
    ) -> Result<(Arc<PacketDescriptor>, usize), FramingError> {
        let descriptor = self
            .descriptor(opcode)
            .ok_or(FramingError::UnknownOpcode(opcode))?;
        match descriptor.frame_size(capabilities) {
            0 => Err(FramingError::InvalidSize { opcode, size: 0 }),
            size => Ok((descriptor, size)),
        }
    }
}

fn default_descriptors() -> Vec<PacketDescriptor> {
    vec![
        PacketDescriptor::of::<Identification>(opcode::IDENTIFICATION, "Identification", 131),
        PacketDescriptor::of::<SetBlock>(opcode::SET_BLOCK, "SetBlock", 9)
            .with_override(capability::EXTENDED_BLOCKS, 10),
        PacketDescriptor::of::<PositionAndOrientation>(
            opcode::POSITION_AND_ORIENTATION,
            "PositionAndOrientation",
            10,
        )
        .with_override(capability::EXT_ENTITY_POSITIONS, 16),
        PacketDescriptor::of::<Message>(opcode::MESSAGE, "Message", 66),
        PacketDescriptor::of::<ExtInfo>(opcode::EXT_INFO, "ExtInfo", 67),
        PacketDescriptor::of::<ExtEntry>(opcode::EXT_ENTRY, "ExtEntry", 69),
        PacketDescriptor::of::<CustomBlockSupportLevel>(
            opcode::CUSTOM_BLOCK_SUPPORT_LEVEL,
            "CustomBlockSupportLevel",
            2,
        ),
        PacketDescriptor::of::<PlayerClicked>(opcode::PLAYER_CLICKED, "PlayerClicked", 15),
        PacketDescriptor::of::<TwoWayPing>(opcode::TWO_WAY_PING, "TwoWayPing", 4),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity_id::EntityId,
        position::{BlockId, BlockPosition, EntityPosition, Orientation},
        protocol::{
            capability::{EXTENDED_BLOCKS, EXT_ENTITY_POSITIONS, FULL_CP437},
            layout::FieldLayout,
            Encode, Encoder,
        },
    };

    fn caps(names: &[&str]) -> CapabilitySet {
        let mut set = CapabilitySet::new();
        for name in names {
            set.add(*name, 1);
        }
        set
    }

    fn samples() -> Vec<ClientPacket> {
        vec![
            Identification {
                protocol_version: 7,
                username: "alice".into(),
                verification_key: "0123456789abcdef".into(),
                magic: 0x42,
            }
            .into(),
            SetBlock {
                position: BlockPosition::new(10, 20, 30),
                mode: 1,
                block: BlockId(45),
            }
            .into(),
            PositionAndOrientation {
                held_block: 0xFF,
                position: EntityPosition::new(100.25, 34.0, -2.5),
                orientation: Orientation {
                    yaw: 360.0,
                    pitch: -90.0,
                },
            }
            .into(),
            Message {
                partial: 0,
                text: "hello world".into(),
            }
            .into(),
            ExtInfo {
                app_name: "ClassiCube".into(),
                extension_count: 30,
            }
            .into(),
            ExtEntry {
                extension_name: "ExtEntityPositions".into(),
                version: 1,
            }
            .into(),
            CustomBlockSupportLevel { level: 1 }.into(),
            PlayerClicked {
                button: 0,
                action: 1,
                yaw: 1000,
                pitch: -200,
                target_entity: EntityId::new(3),
                target_block: BlockPosition::new(1, 2, 3),
                target_face: 4,
            }
            .into(),
            TwoWayPing {
                direction: 0,
                data: 1234,
            }
            .into(),
        ]
    }

    #[test]
    fn every_default_packet_matches_its_declared_size_and_round_trips() {
        let registry = PacketRegistry::with_defaults();
        for capabilities in [
            caps(&[]),
            caps(&[EXT_ENTITY_POSITIONS, EXTENDED_BLOCKS, FULL_CP437]),
        ] {
            let layout = FieldLayout::resolve(&capabilities);
            for packet in samples() {
                let mut frame = Vec::new();
                packet.encode(&mut Encoder::new(&mut frame, layout));
                let size = registry.resolve_size(frame[0], &capabilities).unwrap();
                assert_eq!(frame.len(), size, "{}", packet.as_ref());

                let descriptor = registry.descriptor(frame[0]).unwrap();
                let mut decoder = Decoder::new(&frame[1..], layout);
                let decoded = descriptor.construct(&mut decoder).unwrap();
                decoder.finish().unwrap();
                assert_eq!(decoded, packet);
            }
        }
    }

    #[test]
    fn overrides_apply_per_capability_set() {
        let registry = PacketRegistry::with_defaults();
        let classic = caps(&[]);
        let extended = caps(&[EXT_ENTITY_POSITIONS]);
        assert_eq!(
            registry.resolve_size(opcode::POSITION_AND_ORIENTATION, &classic).unwrap(),
            10
        );
        assert_eq!(
            registry.resolve_size(opcode::POSITION_AND_ORIENTATION, &extended).unwrap(),
            16
        );
        assert_eq!(registry.resolve_size(opcode::SET_BLOCK, &extended).unwrap(), 9);
    }

    #[test]
    fn first_declared_override_wins() {
        let registry = PacketRegistry::new();
        registry.register(
            PacketDescriptor::raw(0xE0, "Test", 5)
                .with_override("Alpha", 7)
                .with_override("Beta", 20),
        );
        assert_eq!(registry.resolve_size(0xE0, &caps(&["Beta"])).unwrap(), 20);
        assert_eq!(registry.resolve_size(0xE0, &caps(&["Alpha"])).unwrap(), 7);
        // both negotiated, in either order: the first declared override applies, no accumulation
        assert_eq!(registry.resolve_size(0xE0, &caps(&["Beta", "Alpha"])).unwrap(), 7);
        assert_eq!(registry.resolve_size(0xE0, &caps(&["Alpha", "Beta"])).unwrap(), 7);
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let registry = PacketRegistry::with_defaults();
        assert!(!registry.register(PacketDescriptor::raw(opcode::MESSAGE, "Impostor", 3)));
        assert_eq!(registry.resolve_size(opcode::MESSAGE, &caps(&[])).unwrap(), 66);
        assert_eq!(registry.descriptor(opcode::MESSAGE).unwrap().name, "Message");
    }

    #[test]
    fn unknown_and_zero_sized_opcodes_are_rejected() {
        let registry = PacketRegistry::with_defaults();
        assert!(matches!(
            registry.resolve_size(0xFF, &caps(&[])),
            Err(FramingError::UnknownOpcode(0xFF))
        ));

        registry.register(PacketDescriptor::raw(0xF0, "Broken", 0));
        assert!(matches!(
            registry.resolve_size(0xF0, &caps(&[])),
            Err(FramingError::InvalidSize { opcode: 0xF0, .. })
        ));
    }

    #[test]
    fn unregister_removes_opcode() {
        let registry = PacketRegistry::with_defaults();
        registry.register(PacketDescriptor::raw(0xD0, "PluginData", 3));
        assert_eq!(registry.resolve_size(0xD0, &caps(&[])).unwrap(), 3);
        assert!(registry.unregister(0xD0).is_some());
        assert!(registry.resolve_size(0xD0, &caps(&[])).is_err());
        assert!(registry.unregister(0xD0).is_none());
    }

    #[test]
    fn raw_descriptor_passes_body_through() {
        let descriptor = PacketDescriptor::raw(0xD1, "PluginData", 4);
        let mut decoder = Decoder::new(&[7, 8, 9], FieldLayout::CLASSIC);
        let packet = descriptor.construct(&mut decoder).unwrap();
        assert!(decoder.is_finished());
        assert_eq!(
            packet,
            ClientPacket::Custom(RawPacket {
                opcode: 0xD1,
                body: vec![7, 8, 9]
            })
        );
    }
}
