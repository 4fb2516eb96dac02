//! Turns frames into packets and hands them to the collaborator.

use crate::{
    client_handle::ClientHandle,
    connection::ConnectionId,
    error::ConnectionError,
    protocol::{
        capability::CapabilitySet,
        layout::FieldLayout,
        packet::client::{ClientPacket, Identification},
        registry::{FramingError, PacketDescriptor, PacketRegistry},
        Decoder,
    },
    server::Clients,
};
use anyhow::anyhow;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

/// What a connection exposes to the packet handler.
#[derive(Copy, Clone, Debug)]
pub struct SessionContext<'a> {
    pub id: ConnectionId,
    /// Empty until the peer has identified.
    pub username: &'a str,
    pub capabilities: &'a CapabilitySet,
    pub handle: &'a ClientHandle,
    pub clients: &'a Clients,
}

/// Game logic behind the protocol engine.
///
/// Callbacks for one connection are never run concurrently, and always in
/// the order the packets arrived. Returning an error (or panicking) closes
/// that connection.
pub trait PacketHandler: Send + Sync + 'static {
    /// The peer has identified and, if it asked to, finished negotiating.
    fn on_login(&self, ctx: &SessionContext<'_>, identification: &Identification)
        -> anyhow::Result<()>;

    fn on_packet(&self, ctx: &SessionContext<'_>, packet: ClientPacket) -> anyhow::Result<()>;

    /// Extension negotiation finished; `ctx.capabilities` is final.
    fn on_negotiated(&self, _ctx: &SessionContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// The connection is gone. Called once, after it left `clients`.
    fn on_disconnect(&self, _id: ConnectionId, _username: Option<&str>, _clients: &Clients) {}
}

pub struct Dispatcher {
    registry: Arc<PacketRegistry>,
    handler: Arc<dyn PacketHandler>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PacketRegistry>, handler: Arc<dyn PacketHandler>) -> Self {
        Self { registry, handler }
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    pub fn handler(&self) -> &dyn PacketHandler {
        &*self.handler
    }

    /// Decodes one frame (opcode byte included), looking its descriptor up
    /// in the registry.
    pub fn decode(&self, frame: &[u8], layout: FieldLayout) -> Result<ClientPacket, ConnectionError> {
        let Some(&opcode) = frame.first() else {
            return Err(FramingError::InvalidSize { opcode: 0, size: 0 }.into());
        };
        let descriptor = self
            .registry
            .descriptor(opcode)
            .ok_or(FramingError::UnknownOpcode(opcode))?;
        self.decode_with(&descriptor, frame, layout)
    }

    /// Decodes one frame with the descriptor that sized it. The packet is
    /// returned only if the factory succeeded and consumed the whole body.
    pub fn decode_with(
        &self,
        descriptor: &PacketDescriptor,
        frame: &[u8],
        layout: FieldLayout,
    ) -> Result<ClientPacket, ConnectionError> {
        let Some((_, body)) = frame.split_first() else {
            return Err(FramingError::InvalidSize {
                opcode: descriptor.opcode,
                size: 0,
            }
            .into());
        };
        let mut decoder = Decoder::new(body, layout);
        descriptor
            .construct(&mut decoder)
            .and_then(|packet| {
                decoder.finish()?;
                Ok(packet)
            })
            .map_err(|source| ConnectionError::Decode {
                packet: descriptor.name.to_string(),
                source,
            })
    }

    /// Runs the handler on a decoded packet.
    pub fn resolve(
        &self,
        packet: ClientPacket,
        ctx: &SessionContext<'_>,
    ) -> Result<(), ConnectionError> {
        let name = packet.name();
        self.guard(name, || self.handler.on_packet(ctx, packet))
    }

    /// Runs a handler callback, turning errors and panics into
    /// [`ConnectionError::Resolve`].
    pub(crate) fn guard(
        &self,
        packet: &str,
        callback: impl FnOnce() -> anyhow::Result<()>,
    ) -> Result<(), ConnectionError> {
        let source = match panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(payload) => anyhow!("Handler panicked: {}", panic_message(&*payload)),
        };
        Err(ConnectionError::Resolve {
            packet: packet.to_owned(),
            source,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic>"
    }
}
