//! The TCP accept loop and state shared by every connection.

use crate::{
    client_handle::ClientHandle,
    config::Config,
    connection::{self, ConnectionId},
    dispatcher::{Dispatcher, PacketHandler},
    protocol::{capability::CapabilitySet, packet::server::ServerPacket, registry::PacketRegistry},
};
use ahash::AHashMap;
use anyhow::Context;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};
use tokio::net::TcpListener;

/// Connections that finished logging in.
#[derive(Debug, Default)]
pub struct Clients {
    clients: RwLock<AHashMap<ConnectionId, ClientHandle>>,
}

impl Clients {
    pub fn insert(&self, handle: ClientHandle) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id(), handle);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<ClientHandle> {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<ClientHandle> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `packet` to every client, encoded for each one's layout.
    pub fn broadcast(&self, packet: impl Into<ServerPacket>) {
        self.send_where(&packet.into(), |_| true);
    }

    pub fn broadcast_except(&self, except: ConnectionId, packet: impl Into<ServerPacket>) {
        self.send_where(&packet.into(), |id| id != except);
    }

    fn send_where(&self, packet: &ServerPacket, filter: impl Fn(ConnectionId) -> bool) {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        for handle in clients.values().filter(|handle| filter(handle.id())) {
            handle.send(packet.clone());
        }
    }
}

/// Everything a connection task needs besides its socket.
pub struct ServerContext {
    pub name: String,
    pub motd: String,
    /// Extensions offered during negotiation.
    pub offered: CapabilitySet,
    pub required_extensions: usize,
    pub ping_interval: Option<Duration>,
    pub dispatcher: Dispatcher,
    pub clients: Clients,
}

impl ServerContext {
    pub fn new(
        config: &Config,
        registry: Arc<PacketRegistry>,
        handler: Arc<dyn PacketHandler>,
    ) -> Self {
        Self {
            name: config.server.name.clone(),
            motd: config.server.motd.clone(),
            offered: config.protocol.offered(),
            required_extensions: config.protocol.required_extensions,
            ping_interval: config.server.ping_interval(),
            dispatcher: Dispatcher::new(registry, handler),
            clients: Clients::default(),
        }
    }
}

pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    next_id: AtomicU32,
}

impl Server {
    /// Binds to `config.server.bind` with the default packet set.
    pub async fn bind(config: &Config, handler: Arc<dyn PacketHandler>) -> anyhow::Result<Self> {
        Self::bind_with_registry(config, Arc::new(PacketRegistry::with_defaults()), handler).await
    }

    /// Binds with a caller-provided registry, which may carry extra opcodes.
    pub async fn bind_with_registry(
        config: &Config,
        registry: Arc<PacketRegistry>,
        handler: Arc<dyn PacketHandler>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.server.bind)
            .await
            .with_context(|| format!("failed to bind {}", config.server.bind))?;
        Ok(Self {
            listener,
            context: Arc::new(ServerContext::new(config, registry, handler)),
            next_id: AtomicU32::new(1),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn clients(&self) -> &Clients {
        &self.context.clients
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        self.context.dispatcher.registry()
    }

    /// Accepts connections until the task is dropped. Each connection runs
    /// on its own task; none of them can stop the loop.
    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);
        loop {
            let (stream, address) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(category = "TransportError", "Failed to accept: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            tracing::info!(%id, "Accepted connection from {address}");
            tokio::spawn(connection::drive_connection(
                stream,
                id,
                Arc::clone(&self.context),
            ));
        }
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::server::Disconnect;
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    fn client(id: u32) -> (ClientHandle, flume::Receiver<Bytes>) {
        let (sender, receiver) = flume::unbounded();
        (
            ClientHandle::new(ConnectionId::new(id), sender, CancellationToken::new()),
            receiver,
        )
    }

    #[test]
    fn broadcast_reaches_everyone_but_the_excluded() {
        let clients = Clients::default();
        let (a, a_frames) = client(1);
        let (b, b_frames) = client(2);
        clients.insert(a);
        clients.insert(b);
        assert_eq!(clients.len(), 2);

        clients.broadcast(ServerPacket::Ping);
        clients.broadcast_except(ConnectionId::new(1), ServerPacket::Ping);
        assert_eq!(a_frames.try_iter().count(), 1);
        assert_eq!(b_frames.try_iter().count(), 2);

        assert!(clients.remove(ConnectionId::new(2)).is_some());
        assert!(clients.get(ConnectionId::new(2)).is_none());
        clients.broadcast(Disconnect {
            reason: "bye".to_owned(),
        });
        assert!(b_frames.try_recv().is_err());
        assert_eq!(a_frames.recv().unwrap().len(), 65);
    }
}
