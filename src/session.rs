//! Per-connection protocol state: login, extension negotiation, then
//! normal play.

use crate::{
    client_handle::ClientHandle,
    connection::ConnectionId,
    dispatcher::SessionContext,
    error::ConnectionError,
    protocol::{
        capability::{CapabilitySet, HandshakeError, Negotiator, Progress},
        frame_reader::FrameSink,
        layout::FieldLayout,
        packet::{
            client::{ClientPacket, Identification},
            extension::{ExtEntry, ExtInfo, TwoWayPing},
            server::ServerIdentification,
        },
        registry::PacketDescriptor,
        PROTOCOL_VERSION,
    },
    server::ServerContext,
};
use std::sync::Arc;

/// Sent as the application name in our `ExtInfo`.
pub const APP_NAME: &str = concat!("classic-server ", env!("CARGO_PKG_VERSION"));

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the identification packet.
    Connecting,
    /// Exchanging `ExtInfo`/`ExtEntry`.
    Handshaking,
    Active,
    Closing,
    Closed,
}

pub struct Session {
    id: ConnectionId,
    state: ConnectionState,
    negotiator: Negotiator,
    layout: FieldLayout,
    identification: Option<Identification>,
    handle: ClientHandle,
    server: Arc<ServerContext>,
}

impl Session {
    pub fn new(handle: ClientHandle, server: Arc<ServerContext>) -> Self {
        Self {
            id: handle.id(),
            state: ConnectionState::Connecting,
            negotiator: Negotiator::new(server.offered.clone(), server.required_extensions),
            layout: FieldLayout::CLASSIC,
            identification: None,
            handle,
            server,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    pub fn username(&self) -> Option<&str> {
        self.identification
            .as_ref()
            .map(|identification| identification.username.as_str())
    }

    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    fn context(&self) -> SessionContext<'_> {
        SessionContext {
            id: self.id,
            username: self.username().unwrap_or_default(),
            capabilities: self.negotiator.capabilities(),
            handle: &self.handle,
            clients: &self.server.clients,
        }
    }

    /// Advances the state machine with one decoded packet.
    pub fn handle_packet(&mut self, packet: ClientPacket) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connecting => self.handle_identification(packet),
            ConnectionState::Handshaking => self.handle_negotiation(packet),
            ConnectionState::Active => self.handle_active(packet),
            ConnectionState::Closing | ConnectionState::Closed => Ok(()),
        }
    }

    fn handle_identification(&mut self, packet: ClientPacket) -> Result<(), ConnectionError> {
        let identification = match packet {
            ClientPacket::Identification(identification) => identification,
            other => return Err(HandshakeError::NotIdentified(other.name()).into()),
        };
        if identification.protocol_version != PROTOCOL_VERSION {
            return Err(HandshakeError::UnsupportedVersion(identification.protocol_version).into());
        }

        tracing::debug!(id = %self.id, "Identified as {}", identification.username);
        let requests_extensions = identification.requests_extensions();
        self.identification = Some(identification);

        if requests_extensions {
            self.state = ConnectionState::Handshaking;
            self.send_extension_list();
            Ok(())
        } else {
            self.enter_active()
        }
    }

    fn send_extension_list(&self) {
        // Counts are bounded by config validation.
        let extension_count = u16::try_from(self.server.offered.len()).unwrap_or(u16::MAX);
        self.handle.send(ExtInfo {
            app_name: APP_NAME.to_owned(),
            extension_count,
        });
        for capability in self.server.offered.iter().take(usize::from(extension_count)) {
            self.handle.send(ExtEntry {
                extension_name: capability.name.clone(),
                version: capability.version,
            });
        }
    }

    fn handle_negotiation(&mut self, packet: ClientPacket) -> Result<(), ConnectionError> {
        let progress = match packet {
            ClientPacket::ExtInfo(info) => self
                .negotiator
                .announce(&info.app_name, usize::from(info.extension_count))?,
            ClientPacket::ExtEntry(entry) => self
                .negotiator
                .entry(&entry.extension_name, entry.version)?,
            ClientPacket::Identification(_) => {
                return Err(HandshakeError::DuplicateIdentification.into())
            }
            other => return Err(HandshakeError::UnexpectedPacket(other.name()).into()),
        };

        match progress {
            Progress::Pending { .. } => Ok(()),
            Progress::Finalized => self.finish_negotiation(),
        }
    }

    fn finish_negotiation(&mut self) -> Result<(), ConnectionError> {
        self.layout = FieldLayout::resolve(self.negotiator.capabilities());
        self.handle.set_layout(self.layout);
        tracing::debug!(
            id = %self.id,
            app = self.negotiator.app_name().unwrap_or_default(),
            "Negotiated {} extensions",
            self.negotiator.capabilities().len()
        );

        let ctx = self.context();
        let handler = self.server.dispatcher.handler();
        self.server
            .dispatcher
            .guard("ExtEntry", || handler.on_negotiated(&ctx))?;
        self.enter_active()
    }

    fn enter_active(&mut self) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Active;
        self.handle.send(ServerIdentification {
            protocol_version: PROTOCOL_VERSION,
            name: self.server.name.clone(),
            motd: self.server.motd.clone(),
            user_type: 0,
        });
        self.server.clients.insert(self.handle.clone());

        let ctx = self.context();
        let handler = self.server.dispatcher.handler();
        match &self.identification {
            Some(identification) => self
                .server
                .dispatcher
                .guard("Identification", || handler.on_login(&ctx, identification)),
            None => Ok(()),
        }
    }

    fn handle_active(&mut self, packet: ClientPacket) -> Result<(), ConnectionError> {
        match packet {
            ClientPacket::Identification(_) => Err(HandshakeError::DuplicateIdentification.into()),
            ClientPacket::ExtInfo(_) if self.negotiator.is_finalized() => {
                Err(HandshakeError::DuplicateAnnounce.into())
            }
            ClientPacket::ExtEntry(_) if self.negotiator.is_finalized() => {
                Err(HandshakeError::EntryAfterFinalize.into())
            }
            ClientPacket::ExtEntry(_) => Err(HandshakeError::EntryBeforeAnnounce.into()),
            ClientPacket::ExtInfo(_) => Err(HandshakeError::UnexpectedPacket("ExtInfo").into()),
            ClientPacket::TwoWayPing(ping) if ping.direction == TwoWayPing::FROM_CLIENT => {
                self.handle.send(ping);
                Ok(())
            }
            packet => self.server.dispatcher.resolve(packet, &self.context()),
        }
    }

    /// Leaves the client list and tells the handler. Safe to call more
    /// than once; only the first call has an effect.
    pub fn shutdown(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let was_active = self.state == ConnectionState::Active;
        self.state = ConnectionState::Closing;
        self.handle.close();

        if was_active {
            self.server.clients.remove(self.id);
            let handler = self.server.dispatcher.handler();
            let (id, username, clients) = (self.id, self.username(), &self.server.clients);
            let disconnect = self
                .server
                .dispatcher
                .guard("Disconnect", || {
                    handler.on_disconnect(id, username, clients);
                    Ok(())
                });
            if let Err(e) = disconnect {
                tracing::warn!(id = %self.id, category = e.category(), "{e}");
            }
        }
        self.state = ConnectionState::Closed;
    }
}

impl FrameSink for Session {
    fn capabilities(&self) -> &CapabilitySet {
        self.negotiator.capabilities()
    }

    fn dispatch(
        &mut self,
        descriptor: &PacketDescriptor,
        frame: &[u8],
    ) -> Result<(), ConnectionError> {
        let packet = self
            .server
            .dispatcher
            .decode_with(descriptor, frame, self.layout)?;
        tracing::trace!(id = %self.id, "Received {}", packet.name());
        self.handle_packet(packet)
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}
